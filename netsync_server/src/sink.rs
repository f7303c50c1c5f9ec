//! Outbound datagram seam.
//!
//! The broadcast path only needs "send these bytes to that address". Keeping
//! it behind a trait lets tests inject failing recipients without touching
//! real sockets.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;

#[async_trait]
pub trait DatagramSink: Send + Sync {
    async fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl DatagramSink for UdpSocket {
    async fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.send_to(payload, target).await
    }
}
