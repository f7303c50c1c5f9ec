//! Server implementation.
//!
//! An authoritative relay with a fixed broadcast rate. Three loops run as
//! independent tasks over one shared [`SessionTable`]:
//! - handshake accept: issues session ids over TCP
//! - receive: ingests client state uploads over UDP
//! - tick: broadcasts one snapshot per active session, then evicts
//!
//! Every loop selects on a shared stop signal; [`ServerHandle::shutdown`]
//! raises it and joins the tasks.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use anyhow::Context;
use netsync_shared::{
    codec::CodecError,
    config::ServerConfig,
    net::{
        is_unreachable_echo, ClientUpdate, Snapshot, MAX_DATAGRAM_SIZE, MAX_UDP_PAYLOAD,
        SNAPSHOT_HEADER_LEN,
    },
    state::SessionId,
};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::watch,
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    handshake::serve_handshake,
    registry::SessionRegistry,
    sessions::{Eviction, Ingest, SessionTable},
    sink::DatagramSink,
};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub snapshot_id: u32,
    pub recipients: usize,
    pub delivered: usize,
    pub failed: Vec<SessionId>,
    /// The encoded snapshot did not fit in one datagram; nothing was sent.
    pub oversized: bool,
    pub evicted: Vec<(SessionId, Eviction)>,
}

/// Socket-independent server state and per-tick logic.
pub struct ServerCore {
    cfg: ServerConfig,
    sessions: Arc<SessionTable>,
    sink: Arc<dyn DatagramSink>,
    snapshot_id: AtomicU32,
}

impl ServerCore {
    pub fn new(cfg: ServerConfig, sessions: Arc<SessionTable>, sink: Arc<dyn DatagramSink>) -> Self {
        Self {
            cfg,
            sessions,
            sink,
            snapshot_id: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.sessions.registry()
    }

    /// Id the next tick will stamp on its snapshots.
    pub fn snapshot_id(&self) -> u32 {
        self.snapshot_id.load(Ordering::Relaxed)
    }

    /// Ingests one inbound datagram.
    ///
    /// Unknown senders are reported as [`Ingest::Unauthenticated`] before the
    /// record is parsed; nothing is ever sent back to them.
    pub fn handle_datagram(
        &self,
        from: SocketAddr,
        buf: &[u8],
        now: Instant,
    ) -> Result<Ingest, CodecError> {
        let session_id = ClientUpdate::peek_session_id(buf)?;
        if !self.registry().contains(&session_id) {
            return Ok(Ingest::Unauthenticated);
        }
        let update = ClientUpdate::decode(buf)?;
        Ok(self
            .sessions
            .ingest(update.session_id, from, update.state, now))
    }

    /// Runs one broadcast + eviction cycle.
    ///
    /// All recipients get snapshots built from the same copy of the table.
    /// Sends run concurrently; a failing recipient is logged and skipped.
    pub async fn tick(&self, now: Instant) -> TickReport {
        let snapshot_id = self.snapshot_id.load(Ordering::Relaxed);
        let table = self.sessions.snapshot();
        let mut report = TickReport {
            snapshot_id,
            recipients: table.recipients.len(),
            ..Default::default()
        };

        if !table.recipients.is_empty() {
            match Snapshot::encode_body(&table.states) {
                Ok(body) if body.len() + SNAPSHOT_HEADER_LEN > MAX_UDP_PAYLOAD => {
                    warn!(
                        snapshot_id,
                        len = body.len() + SNAPSHOT_HEADER_LEN,
                        max = MAX_UDP_PAYLOAD,
                        recipients = table.recipients.len(),
                        "Snapshot exceeds datagram limit, skipping broadcast"
                    );
                    report.oversized = true;
                    report.failed = table.recipients.iter().map(|r| r.session_id).collect();
                }
                Ok(body) => {
                    let mut sends = JoinSet::new();
                    for recipient in table.recipients {
                        let payload =
                            Snapshot::encode_with_body(recipient.session_id, snapshot_id, &body);
                        let sink = Arc::clone(&self.sink);
                        sends.spawn(async move {
                            let result = sink.send_datagram(&payload, recipient.addr).await;
                            (recipient, result)
                        });
                    }

                    while let Some(joined) = sends.join_next().await {
                        match joined {
                            Ok((_, Ok(_))) => report.delivered += 1,
                            Ok((recipient, Err(e))) => {
                                warn!(
                                    session = %recipient.session_id,
                                    addr = %recipient.addr,
                                    error = %e,
                                    "Snapshot send failed"
                                );
                                report.failed.push(recipient.session_id);
                            }
                            Err(e) => error!(error = %e, "Snapshot send task failed"),
                        }
                    }
                }
                Err(e) => error!(snapshot_id, error = %e, "Failed to encode snapshot body"),
            }
        }

        self.snapshot_id.fetch_add(1, Ordering::Relaxed);

        report.evicted = self
            .sessions
            .evict_stale(now, self.cfg.session_timeout());
        for (id, reason) in &report.evicted {
            match reason {
                Eviction::TimedOut => info!(session = %id, "Session evicted (timeout)"),
                Eviction::NeverActivated => {
                    info!(session = %id, "Session pruned (never sent a datagram)")
                }
            }
        }

        trace!(
            snapshot_id,
            recipients = report.recipients,
            delivered = report.delivered,
            "Tick"
        );
        report
    }
}

/// Bound, not yet running server.
pub struct GameServer {
    core: Arc<ServerCore>,
    tcp: TcpListener,
    udp: Arc<UdpSocket>,
}

impl GameServer {
    /// Binds both sockets with an accept-all credential policy.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        Self::bind_with_registry(cfg, SessionRegistry::default()).await
    }

    pub async fn bind_with_registry(
        cfg: ServerConfig,
        registry: SessionRegistry,
    ) -> anyhow::Result<Self> {
        let tcp_addr: SocketAddr = cfg.tcp_addr.parse().context("parse tcp_addr")?;
        let udp_addr: SocketAddr = cfg.udp_addr.parse().context("parse udp_addr")?;

        let tcp = TcpListener::bind(tcp_addr).await.context("tcp bind")?;
        let udp = Arc::new(UdpSocket::bind(udp_addr).await.context("udp bind")?);

        let sessions = Arc::new(SessionTable::new(Arc::new(registry)));
        let sink: Arc<dyn DatagramSink> = udp.clone();
        let core = Arc::new(ServerCore::new(cfg, sessions, sink));

        Ok(Self { core, tcp, udp })
    }

    pub fn core(&self) -> &Arc<ServerCore> {
        &self.core
    }

    pub fn handshake_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    pub fn datagram_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.udp.local_addr()?)
    }

    /// Starts the handshake, receive and tick loops.
    pub fn spawn(self) -> anyhow::Result<ServerHandle> {
        let handshake_addr = self.handshake_addr()?;
        let datagram_addr = self.datagram_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            %handshake_addr,
            %datagram_addr,
            tick_hz = self.core.cfg.tick_hz,
            timeout_ms = self.core.cfg.session_timeout_ms,
            "Server listening"
        );

        let tasks = vec![
            tokio::spawn(handshake_loop(
                self.tcp,
                Arc::clone(&self.core),
                shutdown_rx.clone(),
            )),
            tokio::spawn(receive_loop(
                self.udp,
                Arc::clone(&self.core),
                shutdown_rx.clone(),
            )),
            tokio::spawn(tick_loop(Arc::clone(&self.core), shutdown_rx)),
        ];

        Ok(ServerHandle {
            core: self.core,
            handshake_addr,
            datagram_addr,
            shutdown_tx,
            tasks,
        })
    }
}

/// Running server.
pub struct ServerHandle {
    core: Arc<ServerCore>,
    handshake_addr: SocketAddr,
    datagram_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn core(&self) -> &Arc<ServerCore> {
        &self.core
    }

    pub fn handshake_addr(&self) -> SocketAddr {
        self.handshake_addr
    }

    pub fn datagram_addr(&self) -> SocketAddr {
        self.datagram_addr
    }

    /// Signals every loop to stop and waits for them.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            task.await.context("join server task")?;
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop request.
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn handshake_loop(
    listener: TcpListener,
    core: Arc<ServerCore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut handshakes = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Handshake accept failed");
                        continue;
                    }
                };
                let core = Arc::clone(&core);
                handshakes.spawn(async move {
                    match serve_handshake(stream, core.registry()).await {
                        Ok(Ok(id)) => debug!(%peer, session = %id, "Handshake complete"),
                        Ok(Err(e)) => info!(%peer, error = %e, "Handshake rejected"),
                        Err(e) => warn!(%peer, error = %e, "Handshake transport error"),
                    }
                });
            }
            Some(joined) = handshakes.join_next(), if !handshakes.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Handshake task failed");
                }
            }
            _ = stopped(&mut shutdown_rx) => break,
        }
    }
    // Peers still mid-handshake are cut off.
    handshakes.shutdown().await;
    debug!("Handshake loop stopped");
}

async fn receive_loop(
    udp: Arc<UdpSocket>,
    core: Arc<ServerCore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (n, from) = tokio::select! {
            received = udp.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                // ICMP echoes of earlier sends to a vanished client.
                Err(e) if is_unreachable_echo(&e) => {
                    debug!(error = %e, "Ignoring UDP error from unreachable peer");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "UDP receive failed, stopping receive loop");
                    break;
                }
            },
            _ = stopped(&mut shutdown_rx) => break,
        };

        match core.handle_datagram(from, &buf[..n], Instant::now()) {
            Ok(Ingest::Activated) => info!(%from, "Session active"),
            Ok(Ingest::Updated) => {}
            Ok(Ingest::Unauthenticated) => debug!(%from, "Unknown session, ignoring datagram"),
            Err(e) => debug!(%from, error = %e, "Dropping malformed datagram"),
        }
    }
    debug!("Receive loop stopped");
}

async fn tick_loop(core: Arc<ServerCore>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = time::interval(core.cfg.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                core.tick(Instant::now()).await;
            }
            _ = stopped(&mut shutdown_rx) => break,
        }
    }
    debug!("Tick loop stopped");
}

/// Helper for tests: loopback server on ephemeral ports.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<GameServer> {
    let loopback = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let cfg = ServerConfig {
        tcp_addr: loopback.to_string(),
        udp_addr: loopback.to_string(),
        tick_hz,
        ..Default::default()
    };
    GameServer::bind(cfg).await
}
