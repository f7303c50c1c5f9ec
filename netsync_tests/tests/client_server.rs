//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use netsync_client::{
    client::authenticate,
    input::{InputState, Presentation},
    GameClient,
};
use netsync_shared::{
    math::{Quat, Vec3},
    net::{ClientUpdate, Credentials},
    state::{PlayerState, SessionId, SESSION_ID_LEN},
};
use netsync_tests::{client_config, init_tracing, recv_snapshot_until, spawn_server, WAIT};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};

async fn raw_handshake(addr: std::net::SocketAddr, request: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;
    let mut reply = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut reply)).await??;
    Ok(reply)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_issues_raw_session_bytes() -> anyhow::Result<()> {
    init_tracing();
    let server = spawn_server(30, 5_000).await?;

    let reply = raw_handshake(server.handshake_addr(), b"alice:secret\n").await?;
    assert_eq!(reply.len(), SESSION_ID_LEN);

    let id = SessionId::from_bytes(reply.as_slice().try_into()?);
    assert!(server.core().registry().contains(&id));
    assert_eq!(
        server.core().registry().display_name(&id).as_deref(),
        Some("alice")
    );

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_handshake_gets_error_text() -> anyhow::Result<()> {
    init_tracing();
    let server = spawn_server(30, 5_000).await?;

    let reply = raw_handshake(server.handshake_addr(), b"no separator here\n").await?;
    assert!(reply.starts_with(b"ERROR:"), "{reply:?}");
    assert!(server.core().registry().is_empty());

    let err = authenticate(server.handshake_addr(), &Credentials::new("a:b", "c"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid format"), "{err}");

    server.shutdown().await
}

/// Authenticate, upload once, and get back exactly one record carrying the
/// envelope's id rather than whatever id the record claimed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_update_comes_back_in_snapshot() -> anyhow::Result<()> {
    init_tracing();
    let server = spawn_server(30, 5_000).await?;

    let id = authenticate(server.handshake_addr(), &Credentials::new("alice", "pw")).await?;

    let mut state = PlayerState::new(SessionId::new_random(), Some("alice".into()));
    state.position = Vec3::new(1.5, 0.0, -2.0);
    state.velocity = Vec3::new(0.0, 0.0, 5.0);
    let update = ClientUpdate {
        session_id: id,
        state,
    };

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket
        .send_to(&update.encode()?, server.datagram_addr())
        .await?;

    let snapshot = recv_snapshot_until(&socket, |s| !s.states.is_empty()).await?;
    assert_eq!(snapshot.recipient, id);
    assert_eq!(snapshot.states.len(), 1);

    let record = &snapshot.states[0];
    assert_eq!(record.session_id, id);
    assert_eq!(record.display_name.as_deref(), Some("alice"));
    assert_eq!(record.position, Vec3::new(1.5, 0.0, -2.0));
    assert_eq!(record.velocity, Vec3::new(0.0, 0.0, 5.0));
    assert!(record.alive);

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_sender_gets_nothing() -> anyhow::Result<()> {
    init_tracing();
    let server = spawn_server(60, 5_000).await?;

    let stranger = SessionId::new_random();
    let update = ClientUpdate {
        session_id: stranger,
        state: PlayerState::new(stranger, None),
    };
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket
        .send_to(&update.encode()?, server.datagram_addr())
        .await?;

    let mut buf = [0u8; 64];
    let waited = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(waited.is_err(), "unauthenticated sender received a datagram");
    assert!(server.core().sessions().is_empty());

    server.shutdown().await
}

#[derive(Default)]
struct Frame(Vec<(SessionId, Vec3)>);

impl Presentation for Frame {
    fn apply_visual_state(&mut self, id: SessionId, position: Vec3, _orientation: Quat) {
        self.0.push((id, position));
    }
}

/// Two full clients see each other, and a departed client disappears from
/// the survivor's world once the server times it out.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clients_see_each_other_and_departures() -> anyhow::Result<()> {
    init_tracing();
    let server = spawn_server(60, 300).await?;

    let mut alice = GameClient::connect(&client_config(&server, "alice")).await?;
    let mut bob = GameClient::connect(&client_config(&server, "bob")).await?;
    let dt = 1.0 / 60.0;

    let mut walk = InputState::planar(0.0, 1.0);
    let mut idle = InputState::default();

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        alice.simulate(dt, &mut walk);
        bob.simulate(dt, &mut idle);
        alice.network_tick().await?;
        bob.network_tick().await?;

        let alice_sees_bob = alice.engine().remotes().get(&bob.session_id()).is_some();
        let bob_sees_alice = bob.engine().remotes().get(&alice.session_id()).is_some();
        if alice_sees_bob && bob_sees_alice {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "clients never met");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut frame = Frame::default();
    alice.present(&mut frame);
    assert_eq!(frame.0.len(), 2);
    assert_eq!(frame.0[0].0, alice.session_id());
    assert!(frame.0[0].1.z > 0.0, "local prediction did not move");

    let bob_id = bob.session_id();
    bob.shutdown().await?;

    let deadline = tokio::time::Instant::now() + WAIT;
    while alice.engine().remotes().get(&bob_id).is_some() {
        assert!(tokio::time::Instant::now() < deadline, "bob was never evicted");
        alice.simulate(dt, &mut walk);
        alice.network_tick().await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.core().registry().contains(&bob_id));
    assert!(alice.is_connected());

    alice.shutdown().await?;
    server.shutdown().await
}
