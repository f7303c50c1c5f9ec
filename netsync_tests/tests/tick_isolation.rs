//! Broadcast isolation over real sockets: a recipient whose send fails does
//! not keep the others from getting their snapshot.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use netsync_server::{
    registry::SessionRegistry,
    server::ServerCore,
    sessions::{Ingest, SessionTable},
    sink::DatagramSink,
};
use netsync_shared::{
    math::Vec3,
    net::{ClientUpdate, Credentials},
    state::{PlayerState, SessionId},
};
use netsync_tests::{init_tracing, loopback_config, recv_snapshot};
use tokio::{net::UdpSocket, time::Instant};

/// Real UDP socket that refuses to send to one address.
struct PartitionedSink {
    socket: UdpSocket,
    cut_off: SocketAddr,
}

#[async_trait]
impl DatagramSink for PartitionedSink {
    async fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        if target == self.cut_off {
            return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "partitioned"));
        }
        self.socket.send_datagram(payload, target).await
    }
}

fn join(core: &ServerCore, name: &str, from: SocketAddr, x: f32) -> anyhow::Result<SessionId> {
    let id = core.registry().authenticate(&Credentials::new(name, "pw"))?;
    let mut state = PlayerState::new(id, Some(name.to_string()));
    state.position = Vec3::new(x, 0.0, 0.0);
    let bytes = ClientUpdate {
        session_id: id,
        state,
    }
    .encode()?;
    assert_eq!(
        core.handle_datagram(from, &bytes, Instant::now())?,
        Ingest::Activated
    );
    Ok(id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitioned_recipient_is_skipped() -> anyhow::Result<()> {
    init_tracing();

    let healthy = UdpSocket::bind("127.0.0.1:0").await?;
    let cut = UdpSocket::bind("127.0.0.1:0").await?;

    let sink = Arc::new(PartitionedSink {
        socket: UdpSocket::bind("127.0.0.1:0").await?,
        cut_off: cut.local_addr()?,
    });
    let sessions = Arc::new(SessionTable::new(Arc::new(SessionRegistry::default())));
    let core = ServerCore::new(loopback_config(30, 5_000), sessions, sink);

    let a = join(&core, "a", healthy.local_addr()?, 1.0)?;
    let b = join(&core, "b", cut.local_addr()?, 2.0)?;

    for round in 0..2 {
        let report = core.tick(Instant::now()).await;
        assert_eq!(report.snapshot_id, round);
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![b]);

        let (snapshot, _) = recv_snapshot(&healthy).await?;
        assert_eq!(snapshot.recipient, a);
        assert_eq!(snapshot.snapshot_id, round);
        let ids: Vec<_> = snapshot.states.iter().map(|s| s.session_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    // The failing recipient is still a live session.
    assert!(core.sessions().contains(&b));
    Ok(())
}
