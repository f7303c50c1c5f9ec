//! `netsync_server`
//!
//! Server-side systems:
//! - Session registry and TCP handshake
//! - Active session table with timeout eviction
//! - Fixed-rate snapshot broadcast
//!
//! Networking model:
//! - TCP: one-shot handshake that issues a session id
//! - UDP: client state uploads and per-recipient snapshots

pub mod handshake;
pub mod registry;
pub mod server;
pub mod sessions;
pub mod sink;

pub use server::{GameServer, ServerHandle};
