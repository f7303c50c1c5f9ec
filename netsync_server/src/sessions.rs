//! Active session table: last-known state, last-seen time and address of
//! every session that has sent at least one valid datagram.
//!
//! Lock discipline: registry shard first, then table shard. Ingestion holds
//! the registry entry's read guard while writing the table; eviction removes
//! the registry entry under its write lock and drops the table entry from
//! inside that critical section. A datagram racing an eviction therefore
//! either refreshes `last_seen` first (and the session survives) or finds
//! the id already unregistered.

use std::{net::SocketAddr, sync::Arc};

use dashmap::DashMap;
use netsync_shared::state::{PlayerState, SessionId};
use tokio::time::{Duration, Instant};

use crate::registry::SessionRegistry;

/// Server-side record of one active session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub display_name: String,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub state: PlayerState,
}

/// Outcome of ingesting one client update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// First datagram for this session: Pending -> Active.
    Activated,
    /// Known active session refreshed.
    Updated,
    /// Id not in the registry; the datagram is dropped.
    Unauthenticated,
}

/// One recipient of a tick's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub session_id: SessionId,
    pub addr: SocketAddr,
}

/// Consistent copy of the table taken at the start of a broadcast.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    pub recipients: Vec<Recipient>,
    pub states: Vec<PlayerState>,
}

/// Why a session left the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Active session went silent.
    TimedOut,
    /// Handshake completed but no datagram ever arrived.
    NeverActivated,
}

/// Active sessions keyed by id.
pub struct SessionTable {
    registry: Arc<SessionRegistry>,
    active: DashMap<SessionId, SessionRecord>,
}

impl SessionTable {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            active: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stores the latest state for `session_id` if it is registered.
    ///
    /// The envelope id is authoritative: the record's embedded id is
    /// replaced before storing. Last writer wins; there is no sequence check.
    pub fn ingest(
        &self,
        session_id: SessionId,
        addr: SocketAddr,
        state: PlayerState,
        now: Instant,
    ) -> Ingest {
        let Some(registered) = self.registry.get(&session_id) else {
            return Ingest::Unauthenticated;
        };

        let state = state.with_session_id(session_id);
        let outcome = match self.active.entry(session_id) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                record.addr = addr;
                record.last_seen = now;
                record.state = state;
                Ingest::Updated
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(SessionRecord {
                    session_id,
                    display_name: registered.display_name.clone(),
                    addr,
                    last_seen: now,
                    state,
                });
                Ingest::Activated
            }
        };
        drop(registered);
        outcome
    }

    /// Copies every active session's state and address in one pass.
    pub fn snapshot(&self) -> TableSnapshot {
        let mut out = TableSnapshot {
            recipients: Vec::with_capacity(self.active.len()),
            states: Vec::with_capacity(self.active.len()),
        };
        for entry in self.active.iter() {
            out.recipients.push(Recipient {
                session_id: entry.session_id,
                addr: entry.addr,
            });
            out.states.push(entry.state.clone());
        }
        // Stable ordering across ticks.
        out.recipients.sort_by_key(|r| r.session_id);
        out.states.sort_by_key(|s| s.session_id);
        out
    }

    /// Removes sessions silent for longer than `timeout`, and registered
    /// sessions that never became active within `timeout`.
    pub fn evict_stale(&self, now: Instant, timeout: Duration) -> Vec<(SessionId, Eviction)> {
        let is_stale = |last_seen: Instant| now.saturating_duration_since(last_seen) > timeout;

        let candidates: Vec<SessionId> = self
            .active
            .iter()
            .filter(|entry| is_stale(entry.last_seen))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::new();
        for id in candidates {
            let removed = self.registry.remove_if(&id, |_| {
                self.active
                    .remove_if(&id, |_, record| is_stale(record.last_seen))
                    .is_some()
            });
            if removed.is_some() {
                evicted.push((id, Eviction::TimedOut));
            }
        }

        if let Some(cutoff) = SessionRegistry::cutoff(now, timeout) {
            for id in self.registry.issued_before(cutoff) {
                let removed = self
                    .registry
                    .remove_if(&id, |_| !self.active.contains_key(&id));
                if removed.is_some() {
                    evicted.push((id, Eviction::NeverActivated));
                }
            }
        }

        evicted
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.active.get(id).map(|r| r.clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.active.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
