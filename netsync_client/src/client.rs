//! Client implementation.
//!
//! The client maintains:
//! - A one-shot reliable handshake that yields its session id
//! - An unreliable datagram socket for state uploads and snapshots
//! - A background receive task that forwards decoded snapshots over a channel
//! - The [`ReconciliationEngine`] that owns prediction and remote smoothing
//!
//! Simulation ([`GameClient::simulate`]) never touches the network; network
//! work happens only in [`GameClient::network_tick`].

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use netsync_shared::{
    config::ClientConfig,
    net::{
        is_unreachable_echo, ClientUpdate, Credentials, HandshakeReply, Snapshot,
        MAX_DATAGRAM_SIZE, MAX_HANDSHAKE_LEN,
    },
    state::{PlayerState, SessionId},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpStream, ToSocketAddrs, UdpSocket},
    sync::{
        mpsc::{self, error::TryRecvError, error::TrySendError},
        watch,
    },
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    input::{InputSource, Presentation},
    reconcile::ReconciliationEngine,
};

/// Snapshots buffered between two network ticks before new ones are dropped.
const EVENT_QUEUE_LEN: usize = 64;

/// Messages from the receive task.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Snapshot(Snapshot),
    /// The datagram socket failed; no more snapshots will arrive.
    Disconnected(String),
}

/// What one network tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkTick {
    pub snapshots: usize,
    pub corrected: bool,
}

/// Runs the client side of the handshake and returns the issued session id.
pub async fn authenticate(
    addr: impl ToSocketAddrs,
    credentials: &Credentials,
) -> anyhow::Result<SessionId> {
    let mut stream = TcpStream::connect(addr).await.context("tcp connect")?;
    stream
        .write_all(credentials.to_request_line().as_bytes())
        .await
        .context("send credentials")?;

    // The server closes after its reply, so EOF ends the read.
    let mut reply = Vec::new();
    (&mut stream)
        .take(MAX_HANDSHAKE_LEN as u64)
        .read_to_end(&mut reply)
        .await
        .context("read handshake reply")?;

    let id = HandshakeReply::decode(&reply)?.into_session()?;
    Ok(id)
}

/// High-level game client.
pub struct GameClient {
    engine: ReconciliationEngine,
    udp: Arc<UdpSocket>,
    server: SocketAddr,
    events: mpsc::Receiver<NetEvent>,
    connected: bool,
    tick_interval: Duration,
    last_network_tick: Option<Instant>,
    shutdown_tx: watch::Sender<bool>,
    recv_task: JoinHandle<()>,
}

impl GameClient {
    /// Authenticates, binds a datagram socket and starts receiving.
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let handshake_addr = cfg.handshake_addr();
        info!(server = %handshake_addr, name = %cfg.player_name, "Connecting to server");

        let credentials = Credentials::new(cfg.player_name.clone(), cfg.password.clone());
        let session_id = authenticate(handshake_addr.as_str(), &credentials)
            .await
            .context("handshake")?;

        let server = lookup_host(cfg.datagram_addr())
            .await
            .context("resolve datagram address")?
            .next()
            .with_context(|| format!("no address for {}", cfg.datagram_addr()))?;

        let bind = match server.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let udp = Arc::new(UdpSocket::bind(bind).await.context("udp bind")?);

        let (events_tx, events) = mpsc::channel(EVENT_QUEUE_LEN);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let recv_task = tokio::spawn(receive_loop(
            Arc::clone(&udp),
            session_id,
            events_tx,
            shutdown_rx,
        ));

        info!(session = %session_id, %server, "Connected to server");

        let initial = PlayerState::new(session_id, Some(cfg.player_name.clone()));
        Ok(Self {
            engine: ReconciliationEngine::from_config(initial, cfg),
            udp,
            server,
            events,
            connected: true,
            tick_interval: cfg.tick_interval(),
            last_network_tick: None,
            shutdown_tx,
            recv_task,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.engine.session_id()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// `false` once the receive task has reported a transport failure.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.udp.local_addr()?)
    }

    /// One local simulation step. Returns whether the player moved.
    pub fn simulate(&mut self, dt: f32, input: &mut impl InputSource) -> bool {
        let wish = input.read_movement_input();
        self.engine.step(wish, dt)
    }

    /// Sends the predicted state, applies every snapshot received since the
    /// previous call, then smooths remotes and reconciles.
    pub async fn network_tick(&mut self) -> anyhow::Result<NetworkTick> {
        let now = Instant::now();
        let dt = self
            .last_network_tick
            .map_or(self.tick_interval, |last| now.duration_since(last))
            .as_secs_f32();
        self.last_network_tick = Some(now);

        let update = ClientUpdate {
            session_id: self.session_id(),
            state: self.engine.predicted().clone(),
        };
        let payload = update.encode().context("encode state update")?;
        self.udp
            .send_to(&payload, self.server)
            .await
            .context("send state update")?;

        let mut report = NetworkTick::default();
        loop {
            match self.events.try_recv() {
                Ok(NetEvent::Snapshot(snapshot)) => {
                    report.snapshots += 1;
                    let changes = self.engine.apply_snapshot(snapshot.states);
                    for id in &changes.spawned {
                        info!(session = %id, "Remote player joined");
                    }
                    for id in &changes.removed {
                        info!(session = %id, "Remote player left");
                    }
                }
                Ok(NetEvent::Disconnected(reason)) => {
                    warn!(%reason, "Lost connection to server");
                    self.connected = false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.connected = false;
                    break;
                }
            }
        }

        self.engine.smooth_remotes(dt);
        report.corrected = self.engine.reconcile();
        if report.corrected {
            debug!(error = ?self.engine.prediction_error(), "Prediction corrected");
        }
        Ok(report)
    }

    /// Hands every entity's current pose to `presentation`.
    pub fn present(&self, presentation: &mut impl Presentation) {
        self.engine.present(presentation);
    }

    /// Stops the receive task and waits for it.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.recv_task.await.context("join receive task")?;
        info!(session = %self.engine.session_id(), "Client stopped");
        Ok(())
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn receive_loop(
    udp: Arc<UdpSocket>,
    session_id: SessionId,
    events: mpsc::Sender<NetEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (n, from) = tokio::select! {
            received = udp.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                // An upload reached a closed port; the socket is still fine.
                Err(e) if is_unreachable_echo(&e) => {
                    debug!(error = %e, "Ignoring UDP error from unreachable server");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "UDP receive failed, stopping receive loop");
                    let _ = events.send(NetEvent::Disconnected(e.to_string())).await;
                    break;
                }
            },
            _ = stopped(&mut shutdown_rx) => break,
        };

        let snapshot = match Snapshot::decode(&buf[..n]) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(%from, error = %e, "Dropping malformed snapshot");
                continue;
            }
        };
        if snapshot.recipient != session_id {
            debug!(%from, recipient = %snapshot.recipient, "Snapshot for another session");
            continue;
        }

        match events.try_send(NetEvent::Snapshot(snapshot)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Event queue full, dropping snapshot"),
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!("Receive loop stopped");
}
