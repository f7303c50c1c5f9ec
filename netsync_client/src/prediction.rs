//! Local movement prediction.
//!
//! Pure extrapolation from local input: the predicted state moves the moment
//! input arrives and never waits on the network.

use netsync_shared::{
    math::{Quat, Vec3},
    state::PlayerState,
};

/// Input below this squared magnitude counts as "no input".
pub const INPUT_DEADZONE_SQ: f32 = 0.001;

/// Movement tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSettings {
    /// Units per second.
    pub move_speed: f32,
    /// Degrees per second.
    pub rotation_speed: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            rotation_speed: 720.0,
        }
    }
}

/// Advances `state` by one simulation step of `dt` seconds.
///
/// Position moves along the normalized input direction at `move_speed`;
/// orientation turns toward the heading at no more than `rotation_speed`.
/// Returns whether the state moved.
pub fn apply_movement(
    state: &mut PlayerState,
    input: Vec3,
    dt: f32,
    settings: &MovementSettings,
) -> bool {
    if input.len_sq() <= INPUT_DEADZONE_SQ || dt <= 0.0 {
        state.velocity = Vec3::ZERO;
        return false;
    }

    let dir = input.normalize_or_zero();
    state.velocity = dir * settings.move_speed;
    state.position += state.velocity * dt;

    let heading = Quat::look_rotation(dir, Vec3::UP);
    state.orientation = state
        .orientation
        .rotate_towards(heading, settings.rotation_speed * dt);
    true
}
