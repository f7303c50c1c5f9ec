//! `netsync_client`
//!
//! Client-side systems:
//! - Handshake and datagram wiring ([`GameClient`])
//! - Input and presentation seams for an embedding application
//! - Local movement prediction
//! - Reconciliation against authoritative snapshots
//! - Smoothing for remote entity poses

pub mod client;
pub mod input;
pub mod interp;
pub mod prediction;
pub mod reconcile;

pub use client::{GameClient, NetEvent};
pub use reconcile::ReconciliationEngine;
