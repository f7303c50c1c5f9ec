//! Session registry: which session ids have been issued, and to whom.
//!
//! Entries are created by the handshake and removed only by the tick's
//! eviction pass. The registry is sharded (`DashMap`) so handshakes, datagram
//! ingestion and eviction contend per shard rather than on one global lock.

use dashmap::DashMap;
use netsync_shared::{
    net::{Credentials, HandshakeError},
    state::SessionId,
};
use tokio::time::{Duration, Instant};
use tracing::info;

/// Decides whether a handshake's credentials are acceptable.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, credentials: &Credentials) -> bool;
}

/// Accepts every credential pair. Placeholder until real accounts exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl CredentialValidator for AcceptAll {
    fn validate(&self, _credentials: &Credentials) -> bool {
        true
    }
}

/// One issued session.
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    pub display_name: String,
    pub issued_at: Instant,
}

/// Issued session ids and their display names.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, RegisteredSession>,
    validator: Box<dyn CredentialValidator>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(AcceptAll)
    }
}

impl SessionRegistry {
    pub fn new(validator: impl CredentialValidator + 'static) -> Self {
        Self {
            sessions: DashMap::new(),
            validator: Box::new(validator),
        }
    }

    /// Validates credentials and issues a fresh session id.
    ///
    /// Display names are not required to be unique. On failure the registry
    /// is left untouched.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<SessionId, HandshakeError> {
        if !self.validator.validate(credentials) {
            return Err(HandshakeError::InvalidCredentials);
        }

        let record = RegisteredSession {
            display_name: credentials.username.clone(),
            issued_at: Instant::now(),
        };
        loop {
            let id = SessionId::new_random();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.sessions.entry(id) {
                slot.insert(record);
                info!(session = %id, name = %credentials.username, "Session issued");
                return Ok(id);
            }
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn display_name(&self, id: &SessionId) -> Option<String> {
        self.sessions.get(id).map(|s| s.display_name.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Read guard on one entry; holding it blocks removal of that id.
    pub(crate) fn get(
        &self,
        id: &SessionId,
    ) -> Option<dashmap::mapref::one::Ref<'_, SessionId, RegisteredSession>> {
        self.sessions.get(id)
    }

    /// Removes `id` if `predicate` holds, evaluated under the entry's write lock.
    pub(crate) fn remove_if(
        &self,
        id: &SessionId,
        predicate: impl FnOnce(&RegisteredSession) -> bool,
    ) -> Option<RegisteredSession> {
        self.sessions
            .remove_if(id, |_, session| predicate(session))
            .map(|(_, session)| session)
    }

    /// Ids issued before `cutoff`.
    pub(crate) fn issued_before(&self, cutoff: Instant) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.issued_at < cutoff)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Issued-at cutoff for a given `timeout`, saturating at process start.
    pub(crate) fn cutoff(now: Instant, timeout: Duration) -> Option<Instant> {
        now.checked_sub(timeout)
    }
}
