//! Interpolation.
//!
//! The server sends discrete snapshots at tick boundaries. Remote entities
//! are drawn at a displayed pose that chases the latest received state by a
//! rate-based blend every client tick, hiding the steps between snapshots.

use std::collections::HashMap;

use netsync_shared::{
    math::{Quat, Vec3},
    state::{PlayerState, SessionId},
};

/// One remote player: latest authoritative state plus what is on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub latest: PlayerState,
    pub displayed_position: Vec3,
    pub displayed_orientation: Quat,
}

impl RemoteEntity {
    /// Placeholder for a newly seen session, shown at its received pose.
    pub fn spawn(state: PlayerState) -> Self {
        Self {
            displayed_position: state.position,
            displayed_orientation: state.orientation,
            latest: state,
        }
    }

    /// Moves the displayed pose toward `latest` by blend factor `t`.
    pub fn smooth(&mut self, t: f32) {
        self.displayed_position = self.displayed_position.lerp(self.latest.position, t);
        self.displayed_orientation = self
            .displayed_orientation
            .slerp(self.latest.orientation, t);
    }
}

/// What a snapshot merge changed in the remote set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChanges {
    pub spawned: Vec<SessionId>,
    pub removed: Vec<SessionId>,
}

/// Remote players keyed by session id.
#[derive(Debug, Clone, Default)]
pub struct RemoteEntities {
    entities: HashMap<SessionId, RemoteEntity>,
}

impl RemoteEntities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `state`; returns `true` if the id was new.
    pub fn upsert(&mut self, state: PlayerState) -> bool {
        match self.entities.get_mut(&state.session_id) {
            Some(entity) => {
                entity.latest = state;
                false
            }
            None => {
                self.entities
                    .insert(state.session_id, RemoteEntity::spawn(state));
                true
            }
        }
    }

    /// Drops every entity whose id is not in `present`.
    pub fn retain_present(&mut self, present: &[SessionId]) -> Vec<SessionId> {
        let removed: Vec<SessionId> = self
            .entities
            .keys()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();
        for id in &removed {
            self.entities.remove(id);
        }
        removed
    }

    /// Blends every displayed pose toward its latest state.
    ///
    /// `rate` is responsiveness per second; the per-call factor is
    /// `rate * dt`, clamped to 1.
    pub fn smooth_all(&mut self, rate: f32, dt: f32) {
        let t = (rate * dt).clamp(0.0, 1.0);
        for entity in self.entities.values_mut() {
            entity.smooth(t);
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&RemoteEntity> {
        self.entities.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &RemoteEntity)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: SessionId, x: f32) -> PlayerState {
        let mut s = PlayerState::new(id, None);
        s.position = Vec3::new(x, 0.0, 0.0);
        s
    }

    #[test]
    fn new_remote_spawns_at_received_pose() {
        let mut remotes = RemoteEntities::new();
        let id = SessionId::new_random();
        assert!(remotes.upsert(at(id, 3.0)));
        assert!(!remotes.upsert(at(id, 4.0)));

        let e = remotes.get(&id).unwrap();
        assert_eq!(e.displayed_position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(e.latest.position, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn smoothing_is_rate_times_dt() {
        let mut remotes = RemoteEntities::new();
        let id = SessionId::new_random();
        remotes.upsert(at(id, 0.0));
        remotes.upsert(at(id, 10.0));

        remotes.smooth_all(10.0, 0.05);
        let x = remotes.get(&id).unwrap().displayed_position.x;
        assert!((x - 5.0).abs() < 1e-4);

        // A long frame snaps instead of overshooting.
        remotes.smooth_all(10.0, 1.0);
        assert_eq!(remotes.get(&id).unwrap().displayed_position.x, 10.0);
    }

    #[test]
    fn retain_present_removes_departed() {
        let mut remotes = RemoteEntities::new();
        let a = SessionId::new_random();
        let b = SessionId::new_random();
        remotes.upsert(at(a, 0.0));
        remotes.upsert(at(b, 0.0));

        let removed = remotes.retain_present(&[a]);
        assert_eq!(removed, vec![b]);
        assert_eq!(remotes.len(), 1);
        assert!(remotes.get(&a).is_some());
    }
}
