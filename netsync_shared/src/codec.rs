//! Binary wire codec.
//!
//! Every datagram is a flat sequence of fixed-width fields:
//! - 32-bit integers and floats: 4 bytes, little-endian
//! - booleans: 1 byte, nonzero is `true`
//! - session ids: 16 raw bytes
//! - strings: tag byte, optional length, UTF-8 bytes (see [`StringTag`])
//!
//! The field order of a [`PlayerState`] record is part of the wire contract:
//! id, position, velocity, orientation, alive, display name.
//!
//! Readers never hand out a partially decoded value: a failed read returns
//! a [`CodecError`] and the caller drops the packet.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    math::{Quat, Vec3},
    state::{PlayerState, SessionId, SESSION_ID_LEN},
};

/// Largest UTF-8 payload accepted for a single string.
pub const MAX_STRING_LEN: usize = 1024 * 1024;

/// Largest string written with the one-byte length prefix.
pub const MAX_SHORT_STRING_LEN: usize = u8::MAX as usize;

/// String discriminator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StringTag {
    Absent = 0,
    Empty = 1,
    Short = 2,
    Long = 3,
}

impl StringTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(StringTag::Absent),
            1 => Some(StringTag::Empty),
            2 => Some(StringTag::Short),
            3 => Some(StringTag::Long),
            _ => None,
        }
    }
}

/// Codec failures. All of them are fatal to the packet being processed and
/// to nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("packet ended unexpectedly: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEndOfData { needed: usize, remaining: usize },

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Accumulates fields into a growable buffer.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn write_session_id(&mut self, id: SessionId) {
        self.buf.put_slice(id.as_bytes());
    }

    /// Writes an optional string, choosing the most compact tag.
    ///
    /// Nothing is written when the string is rejected.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        let Some(s) = value else {
            self.buf.put_u8(StringTag::Absent as u8);
            return Ok(());
        };
        if s.is_empty() {
            self.buf.put_u8(StringTag::Empty as u8);
            return Ok(());
        }

        let bytes = s.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(CodecError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_STRING_LEN,
            });
        }

        if bytes.len() <= MAX_SHORT_STRING_LEN {
            self.buf.put_u8(StringTag::Short as u8);
            self.buf.put_u8(bytes.len() as u8);
        } else {
            self.buf.put_u8(StringTag::Long as u8);
            self.buf.put_i32_le(bytes.len() as i32);
        }
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_quat(&mut self, q: Quat) {
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
        self.write_f32(q.w);
    }

    /// Writes one player record. On error the buffer is left as it was.
    pub fn write_player_state(&mut self, state: &PlayerState) -> Result<(), CodecError> {
        let start = self.buf.len();
        self.write_session_id(state.session_id);
        self.write_vec3(state.position);
        self.write_vec3(state.velocity);
        self.write_quat(state.orientation);
        self.write_bool(state.alive);
        if let Err(e) = self.write_string(state.display_name.as_deref()) {
            self.buf.truncate(start);
            return Err(e);
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Hands the accumulated bytes off as an immutable, cheaply cloned buffer.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Consumes fields from a fixed byte buffer.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    rest: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, rest: data }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.data.len() - self.rest.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.rest.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if self.rest.len() < needed {
            return Err(CodecError::UnexpectedEndOfData {
                needed,
                remaining: self.rest.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        Ok(self.rest.get_u8())
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        Ok(self.rest.get_i32_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        Ok(self.rest.get_u32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.ensure(4)?;
        Ok(self.rest.get_f32_le())
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_session_id(&mut self) -> Result<SessionId, CodecError> {
        self.ensure(SESSION_ID_LEN)?;
        let mut bytes = [0u8; SESSION_ID_LEN];
        self.rest.copy_to_slice(&mut bytes);
        Ok(SessionId::from_bytes(bytes))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Ok(head)
    }

    pub fn read_string(&mut self) -> Result<Option<String>, CodecError> {
        let tag = self.read_u8()?;
        let len = match StringTag::from_u8(tag) {
            Some(StringTag::Absent) => return Ok(None),
            Some(StringTag::Empty) => return Ok(Some(String::new())),
            Some(StringTag::Short) => self.read_u8()? as i64,
            Some(StringTag::Long) => self.read_i32()? as i64,
            None => {
                return Err(CodecError::InvalidEncoding(format!(
                    "unknown string tag {tag}"
                )))
            }
        };

        if !(0..=MAX_STRING_LEN as i64).contains(&len) {
            return Err(CodecError::InvalidEncoding(format!(
                "string length {len} out of range"
            )));
        }

        let bytes = self.read_bytes(len as usize)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::InvalidEncoding(format!("string is not UTF-8: {e}")))?;
        Ok(Some(s.to_owned()))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_quat(&mut self) -> Result<Quat, CodecError> {
        Ok(Quat::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_player_state(&mut self) -> Result<PlayerState, CodecError> {
        let session_id = self.read_session_id()?;
        let position = self.read_vec3()?;
        let velocity = self.read_vec3()?;
        let orientation = self.read_quat()?;
        let alive = self.read_bool()?;
        let display_name = self.read_string()?;
        Ok(PlayerState {
            session_id,
            display_name,
            position,
            velocity,
            orientation,
            alive,
        })
    }
}
