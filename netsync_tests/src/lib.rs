//! Shared helpers for the socket-level integration tests.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use netsync_server::{GameServer, ServerHandle};
use netsync_shared::{
    config::{ClientConfig, ServerConfig},
    net::{Snapshot, MAX_DATAGRAM_SIZE},
};
use tokio::net::UdpSocket;

/// Upper bound on any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(3);

/// Installs a test-writer subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Loopback server config on ephemeral ports.
pub fn loopback_config(tick_hz: u32, session_timeout_ms: u64) -> ServerConfig {
    ServerConfig {
        tcp_addr: "127.0.0.1:0".into(),
        udp_addr: "127.0.0.1:0".into(),
        tick_hz,
        session_timeout_ms,
    }
}

/// Binds and starts a loopback server.
pub async fn spawn_server(tick_hz: u32, session_timeout_ms: u64) -> anyhow::Result<ServerHandle> {
    GameServer::bind(loopback_config(tick_hz, session_timeout_ms))
        .await?
        .spawn()
}

/// Client config pointing at `server`.
pub fn client_config(server: &ServerHandle, name: &str) -> ClientConfig {
    ClientConfig {
        server_host: server.handshake_addr().ip().to_string(),
        tcp_port: server.handshake_addr().port(),
        udp_port: server.datagram_addr().port(),
        tick_hz: 60,
        player_name: name.to_string(),
        ..Default::default()
    }
}

/// Waits for the next well-formed snapshot on `socket`.
pub async fn recv_snapshot(socket: &UdpSocket) -> anyhow::Result<(Snapshot, SocketAddr)> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let (n, from) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .context("timed out waiting for snapshot")??;
    let snapshot = Snapshot::decode(&buf[..n]).context("decode snapshot")?;
    Ok((snapshot, from))
}

/// Receives snapshots until one satisfies `pred`.
pub async fn recv_snapshot_until(
    socket: &UdpSocket,
    mut pred: impl FnMut(&Snapshot) -> bool,
) -> anyhow::Result<Snapshot> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "no matching snapshot before deadline"
        );
        let (snapshot, _) = recv_snapshot(socket).await?;
        if pred(&snapshot) {
            return Ok(snapshot);
        }
    }
}
