//! Networking primitives.
//!
//! Two channels:
//! - Reliable (TCP): a one-shot handshake that issues a [`SessionId`].
//! - Unreliable (UDP): client state uploads and server snapshots, encoded
//!   with the binary [`codec`](crate::codec).
//!
//! Datagram layouts:
//!
//! ```text
//! client -> server  [session id:16][PlayerState]
//! server -> client  [recipient id:16][snapshot id:4][PlayerState]*
//! ```
//!
//! Snapshot records run back-to-back until the datagram is exhausted; there
//! is no record count.

use std::io;

use bytes::Bytes;
use thiserror::Error;

use crate::{
    codec::{CodecError, PacketReader, PacketWriter},
    state::{PlayerState, SessionId, SESSION_ID_LEN},
};

/// Default handshake (TCP) port.
pub const DEFAULT_HANDSHAKE_PORT: u16 = 9000;

/// Default datagram (UDP) port.
pub const DEFAULT_DATAGRAM_PORT: u16 = 7777;

/// Receive buffer size for datagrams on both sides.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Largest payload one IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Cap on a handshake request or reply.
pub const MAX_HANDSHAKE_LEN: usize = 1024;

/// Prefix of a textual handshake rejection.
pub const HANDSHAKE_ERROR_PREFIX: &str = "ERROR:";

/// Size of the snapshot header that precedes the records.
pub const SNAPSHOT_HEADER_LEN: usize = SESSION_ID_LEN + 4;

/// Whether a datagram receive error is an ICMP port-unreachable echo of an
/// earlier send rather than a failure of the local socket. Some platforms
/// surface these on unconnected UDP sockets; the socket stays usable.
pub fn is_unreachable_echo(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

/// Client -> server state upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientUpdate {
    /// Session the sender claims; the only id the server trusts.
    pub session_id: SessionId,
    pub state: PlayerState,
}

impl ClientUpdate {
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = PacketWriter::new();
        w.write_session_id(self.session_id);
        w.write_player_state(&self.state)?;
        Ok(w.freeze())
    }

    /// Decodes the envelope id and exactly one record; trailing bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = PacketReader::new(buf);
        let session_id = r.read_session_id()?;
        let state = r.read_player_state()?;
        Ok(Self { session_id, state })
    }

    /// Reads only the leading session id, so unknown senders can be dropped
    /// before the record is parsed.
    pub fn peek_session_id(buf: &[u8]) -> Result<SessionId, CodecError> {
        PacketReader::new(buf).read_session_id()
    }
}

/// Server -> client snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub recipient: SessionId,
    /// Wraps silently; informational only.
    pub snapshot_id: u32,
    pub states: Vec<PlayerState>,
}

impl Snapshot {
    /// Encodes the record list shared by every recipient of one tick.
    pub fn encode_body(states: &[PlayerState]) -> Result<Bytes, CodecError> {
        let mut w = PacketWriter::with_capacity(states.len() * 64);
        for state in states {
            w.write_player_state(state)?;
        }
        Ok(w.freeze())
    }

    /// Prepends one recipient's header to a pre-encoded body.
    pub fn encode_with_body(recipient: SessionId, snapshot_id: u32, body: &[u8]) -> Bytes {
        let mut w = PacketWriter::with_capacity(SNAPSHOT_HEADER_LEN + body.len());
        w.write_session_id(recipient);
        w.write_u32(snapshot_id);
        w.write_bytes(body);
        w.freeze()
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let body = Self::encode_body(&self.states)?;
        Ok(Self::encode_with_body(self.recipient, self.snapshot_id, &body))
    }

    /// Decodes a whole snapshot. Any malformed record fails the datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = PacketReader::new(buf);
        let recipient = r.read_session_id()?;
        let snapshot_id = r.read_u32()?;
        let mut states = Vec::new();
        while !r.is_exhausted() {
            states.push(r.read_player_state()?);
        }
        Ok(Self {
            recipient,
            snapshot_id,
            states,
        })
    }
}

/// Handshake request failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Invalid format")]
    InvalidFormat,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid response from auth server")]
    InvalidReply,

    #[error("server rejected handshake: {0}")]
    Rejected(String),
}

/// `username:password` credentials sent over the reliable channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parses one request line. Surrounding whitespace (including the
    /// trailing newline) is ignored; exactly two `:`-separated fields are
    /// required.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let mut parts = line.trim().split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(username), Some(password), None) => Ok(Self::new(username, password)),
            _ => Err(HandshakeError::InvalidFormat),
        }
    }

    /// Wire form, newline terminated.
    pub fn to_request_line(&self) -> String {
        format!("{}:{}\n", self.username, self.password)
    }
}

/// Server answer to a handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    Accepted(SessionId),
    Rejected(String),
}

impl HandshakeReply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HandshakeReply::Accepted(id) => id.as_bytes().to_vec(),
            HandshakeReply::Rejected(reason) => {
                format!("{HANDSHAKE_ERROR_PREFIX}{reason}").into_bytes()
            }
        }
    }

    /// Interprets everything the server sent before closing the connection.
    pub fn decode(buf: &[u8]) -> Result<Self, HandshakeError> {
        if let Some(reason) = buf.strip_prefix(HANDSHAKE_ERROR_PREFIX.as_bytes()) {
            return Ok(HandshakeReply::Rejected(
                String::from_utf8_lossy(reason).trim().to_string(),
            ));
        }
        let bytes: [u8; SESSION_ID_LEN] =
            buf.try_into().map_err(|_| HandshakeError::InvalidReply)?;
        Ok(HandshakeReply::Accepted(SessionId::from_bytes(bytes)))
    }

    /// Collapses a rejection into an error.
    pub fn into_session(self) -> Result<SessionId, HandshakeError> {
        match self {
            HandshakeReply::Accepted(id) => Ok(id),
            HandshakeReply::Rejected(reason) => Err(HandshakeError::Rejected(reason)),
        }
    }
}
