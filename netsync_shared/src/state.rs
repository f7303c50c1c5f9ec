//! Session identity and the replicated player state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::math::{Quat, Vec3};

/// Size of a [`SessionId`] on the wire.
pub const SESSION_ID_LEN: usize = 16;

/// Identifies a player for the lifetime of one authenticated connection.
///
/// Issued by the server during the handshake; random, 128 bits, and never
/// reused within one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Placeholder used before a session has been issued.
    pub const NIL: Self = Self(Uuid::nil());

    /// Fresh random (v4) identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 16 bytes written to the wire, verbatim.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        self.0.as_bytes()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Transient state of one player, replicated every tick.
///
/// A plain value: copies are independent and a fresher state always replaces
/// the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub session_id: SessionId,
    pub display_name: Option<String>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub alive: bool,
}

impl PlayerState {
    /// Default state for a freshly issued session.
    pub fn new(session_id: SessionId, display_name: Option<String>) -> Self {
        Self {
            session_id,
            display_name,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            alive: true,
        }
    }

    /// Copy of this state re-keyed to `session_id`.
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new(SessionId::NIL, None)
    }
}
