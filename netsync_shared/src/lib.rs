//! `netsync_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One explicit binary wire format, byte-compatible across implementations.
//! - Value-typed player state; no shared ownership between threads.
//! - Typed, matchable errors for per-packet decisions.
//! - No `unsafe`.

pub mod codec;
pub mod config;
pub mod math;
pub mod net;
pub mod state;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::codec::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::state::*;
}
