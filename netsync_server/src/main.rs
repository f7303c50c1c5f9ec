//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p netsync_server -- [--config server.json] [--tcp-addr 0.0.0.0:9000]
//!       [--udp-addr 0.0.0.0:7777] [--tick-hz 30] [--timeout-ms 5000]
//!
//! The server issues session ids over TCP, ingests client state over UDP and
//! broadcasts snapshots at a fixed rate until Ctrl-C.

use std::env;

use anyhow::Context;
use netsync_server::GameServer;
use netsync_shared::config::ServerConfig;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ServerConfig::from_json_file(&args[i + 1])?,
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tcp-addr" if i + 1 < args.len() => {
                cfg.tcp_addr = args[i + 1].clone();
                i += 2;
            }
            "--udp-addr" if i + 1 < args.len() => {
                cfg.udp_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            "--timeout-ms" if i + 1 < args.len() => {
                cfg.session_timeout_ms = args[i + 1].parse().context("parse --timeout-ms")?;
                i += 2;
            }
            "--config" => i += 2,
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        tcp = %cfg.tcp_addr,
        udp = %cfg.udp_addr,
        tick_hz = cfg.tick_hz,
        timeout_ms = cfg.session_timeout_ms,
        "Starting server"
    );

    let server = GameServer::bind(cfg).await.context("bind server")?;
    let handle = server.spawn()?;

    println!("Server ready. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;

    info!("Shutting down");
    handle.shutdown().await
}
