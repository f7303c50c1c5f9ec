//! Prediction/reconciliation engine.
//!
//! Holds the locally predicted state, the latest authoritative copy of that
//! same state as reported by the server, and every remote player. Snapshots
//! never overwrite the prediction directly; [`ReconciliationEngine::reconcile`]
//! blends it toward the authoritative value once per network tick when the
//! two have drifted apart.

use netsync_shared::{
    config::ClientConfig,
    math::Vec3,
    state::{PlayerState, SessionId},
};

use crate::{
    input::Presentation,
    interp::{RemoteChanges, RemoteEntities},
    prediction::{apply_movement, MovementSettings},
};

/// Correction and smoothing tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileSettings {
    /// Prediction error at or below which nothing is corrected.
    pub correction_threshold: f32,
    /// Fraction of the error removed per correction, in `(0, 1]`.
    pub correction_blend: f32,
    /// Remote smoothing responsiveness per second.
    pub remote_smoothing_rate: f32,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            correction_threshold: 0.05,
            correction_blend: 0.2,
            remote_smoothing_rate: 10.0,
        }
    }
}

/// Client-side state of the world.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    predicted: PlayerState,
    authoritative: Option<PlayerState>,
    remotes: RemoteEntities,
    movement: MovementSettings,
    settings: ReconcileSettings,
}

impl ReconciliationEngine {
    pub fn new(
        initial: PlayerState,
        movement: MovementSettings,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            predicted: initial,
            authoritative: None,
            remotes: RemoteEntities::new(),
            movement,
            settings,
        }
    }

    pub fn from_config(initial: PlayerState, cfg: &ClientConfig) -> Self {
        Self::new(
            initial,
            MovementSettings {
                move_speed: cfg.move_speed,
                rotation_speed: cfg.rotation_speed,
            },
            ReconcileSettings {
                correction_threshold: cfg.correction_threshold,
                correction_blend: cfg.correction_blend,
                remote_smoothing_rate: cfg.remote_smoothing_rate,
            },
        )
    }

    pub fn session_id(&self) -> SessionId {
        self.predicted.session_id
    }

    pub fn predicted(&self) -> &PlayerState {
        &self.predicted
    }

    pub fn authoritative(&self) -> Option<&PlayerState> {
        self.authoritative.as_ref()
    }

    pub fn remotes(&self) -> &RemoteEntities {
        &self.remotes
    }

    /// Local simulation step. Never blocked by the network.
    pub fn step(&mut self, input: Vec3, dt: f32) -> bool {
        apply_movement(&mut self.predicted, input, dt, &self.movement)
    }

    /// Merges one snapshot's records.
    ///
    /// The local session's record replaces the stored authoritative copy;
    /// every other record upserts the remote set, and remotes missing from
    /// the snapshot are dropped.
    pub fn apply_snapshot(&mut self, states: Vec<PlayerState>) -> RemoteChanges {
        let own = self.session_id();
        let mut changes = RemoteChanges::default();
        let mut present = Vec::with_capacity(states.len());

        for state in states {
            if state.session_id == own {
                self.authoritative = Some(state);
                continue;
            }
            present.push(state.session_id);
            let id = state.session_id;
            if self.remotes.upsert(state) {
                changes.spawned.push(id);
            }
        }

        changes.removed = self.remotes.retain_present(&present);
        changes
    }

    /// Distance between the prediction and the last authoritative position.
    pub fn prediction_error(&self) -> Option<f32> {
        self.authoritative
            .as_ref()
            .map(|auth| self.predicted.position.distance(auth.position))
    }

    /// Blends the prediction toward the authoritative state if the error
    /// exceeds the threshold. Returns whether a correction was applied.
    pub fn reconcile(&mut self) -> bool {
        let Some(auth) = &self.authoritative else {
            return false;
        };
        if self.predicted.position.distance(auth.position) <= self.settings.correction_threshold {
            return false;
        }

        let t = self.settings.correction_blend;
        self.predicted.position = self.predicted.position.lerp(auth.position, t);
        self.predicted.orientation = self.predicted.orientation.slerp(auth.orientation, t);
        true
    }

    /// Per-tick remote smoothing with `dt` seconds since the last call.
    pub fn smooth_remotes(&mut self, dt: f32) {
        self.remotes
            .smooth_all(self.settings.remote_smoothing_rate, dt);
    }

    /// Hands the local and every remote pose to the presentation layer.
    pub fn present(&self, presentation: &mut impl Presentation) {
        presentation.apply_visual_state(
            self.predicted.session_id,
            self.predicted.position,
            self.predicted.orientation,
        );
        for (id, remote) in self.remotes.iter() {
            presentation.apply_visual_state(
                *id,
                remote.displayed_position,
                remote.displayed_orientation,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_shared::math::Quat;

    fn engine() -> (ReconciliationEngine, SessionId) {
        let id = SessionId::new_random();
        let engine = ReconciliationEngine::new(
            PlayerState::new(id, Some("me".into())),
            MovementSettings::default(),
            ReconcileSettings::default(),
        );
        (engine, id)
    }

    fn at(id: SessionId, pos: Vec3) -> PlayerState {
        let mut s = PlayerState::new(id, None);
        s.position = pos;
        s
    }

    #[test]
    fn own_record_updates_authoritative_not_prediction() {
        let (mut engine, me) = engine();
        engine.step(Vec3::new(0.0, 0.0, 1.0), 1.0);
        let predicted = engine.predicted().clone();

        engine.apply_snapshot(vec![at(me, Vec3::new(9.0, 0.0, 0.0))]);

        assert_eq!(engine.predicted(), &predicted);
        assert_eq!(
            engine.authoritative().unwrap().position,
            Vec3::new(9.0, 0.0, 0.0)
        );
        assert!(engine.remotes().is_empty());
    }

    #[test]
    fn snapshot_spawns_updates_and_removes_remotes() {
        let (mut engine, me) = engine();
        let a = SessionId::new_random();
        let b = SessionId::new_random();

        let changes = engine.apply_snapshot(vec![
            at(me, Vec3::ZERO),
            at(a, Vec3::new(1.0, 0.0, 0.0)),
            at(b, Vec3::new(2.0, 0.0, 0.0)),
        ]);
        assert_eq!(changes.spawned.len(), 2);
        assert!(changes.removed.is_empty());
        assert_eq!(engine.remotes().len(), 2);

        let changes = engine.apply_snapshot(vec![at(a, Vec3::new(5.0, 0.0, 0.0))]);
        assert!(changes.spawned.is_empty());
        assert_eq!(changes.removed, vec![b]);
        assert_eq!(
            engine.remotes().get(&a).unwrap().latest.position,
            Vec3::new(5.0, 0.0, 0.0)
        );
        // Own state is kept from the earlier snapshot.
        assert!(engine.authoritative().is_some());
    }

    #[test]
    fn small_error_is_left_alone() {
        let (mut engine, me) = engine();
        engine.apply_snapshot(vec![at(me, Vec3::new(0.05, 0.0, 0.0))]);
        assert!(!engine.reconcile());
        assert_eq!(engine.predicted().position, Vec3::ZERO);
    }

    #[test]
    fn correction_blends_position_and_orientation() {
        let (mut engine, me) = engine();
        let mut auth = at(me, Vec3::new(1.0, 0.0, 0.0));
        auth.orientation = Quat::from_axis_angle(Vec3::UP, std::f32::consts::FRAC_PI_2);
        engine.apply_snapshot(vec![auth]);

        assert!(engine.reconcile());
        assert!((engine.predicted().position.x - 0.2).abs() < 1e-6);
        let turned = Quat::IDENTITY.angle_deg(engine.predicted().orientation);
        assert!((turned - 18.0).abs() < 0.1, "turned {turned}");
    }

    #[test]
    fn reconciliation_converges_monotonically() {
        let epsilon = 0.05;
        for offset in [0.06_f32, 1.0, 37.5, 1.0e4] {
            let (mut engine, me) = engine();
            engine.apply_snapshot(vec![at(me, Vec3::new(offset, -offset, offset))]);

            let start = engine.prediction_error().unwrap();
            // (1 - blend)^n * start <= epsilon
            let bound = ((epsilon / start).ln() / 0.8_f32.ln()).ceil() as usize + 1;

            let mut last = start;
            let mut steps = 0;
            while engine.reconcile() {
                let err = engine.prediction_error().unwrap();
                assert!(err < last, "error grew from {last} to {err}");
                last = err;
                steps += 1;
                assert!(steps <= bound, "no convergence after {steps} steps");
            }
            assert!(last <= epsilon);
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<(SessionId, Vec3)>);

    impl Presentation for Recorder {
        fn apply_visual_state(&mut self, id: SessionId, position: Vec3, _orientation: Quat) {
            self.0.push((id, position));
        }
    }

    #[test]
    fn present_emits_local_then_remotes() {
        let (mut engine, me) = engine();
        let other = SessionId::new_random();
        engine.apply_snapshot(vec![at(other, Vec3::new(3.0, 0.0, 0.0))]);

        let mut recorder = Recorder::default();
        engine.present(&mut recorder);
        assert_eq!(recorder.0.len(), 2);
        assert_eq!(recorder.0[0].0, me);
        assert_eq!(recorder.0[1], (other, Vec3::new(3.0, 0.0, 0.0)));
    }
}
