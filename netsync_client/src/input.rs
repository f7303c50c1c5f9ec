//! Input and presentation seams.
//!
//! The client core never talks to windowing, input devices or a renderer.
//! An embedding application supplies an [`InputSource`] that is polled once
//! per simulation step and a [`Presentation`] that receives one pose per
//! entity per frame.

use netsync_shared::{
    math::{Quat, Vec3},
    state::SessionId,
};

/// Raw movement input, polled once per simulation step.
pub trait InputSource {
    /// Desired movement direction in world space. Magnitude is ignored;
    /// a (near) zero vector means "stand still".
    fn read_movement_input(&mut self) -> Vec3;
}

/// Receives the pose to draw for each entity, once per frame.
pub trait Presentation {
    fn apply_visual_state(&mut self, id: SessionId, position: Vec3, orientation: Quat);
}

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
}

impl InputState {
    /// Planar stick/WASD input; `up` stays zero.
    pub fn planar(right: f32, forward: f32) -> Self {
        Self {
            forward,
            right,
            up: 0.0,
        }
    }

    /// Maps right/up/forward onto world X/Y/Z.
    pub fn wish_vector(self) -> Vec3 {
        Vec3::new(self.right, self.up, self.forward)
    }
}

impl InputSource for InputState {
    fn read_movement_input(&mut self) -> Vec3 {
        self.wish_vector()
    }
}

impl<F: FnMut() -> Vec3> InputSource for F {
    fn read_movement_input(&mut self) -> Vec3 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_input_maps_onto_xz() {
        let mut input = InputState::planar(1.0, -0.5);
        assert_eq!(input.read_movement_input(), Vec3::new(1.0, 0.0, -0.5));
    }

    #[test]
    fn closures_are_input_sources() {
        let mut n = 0.0;
        let mut source = || {
            n += 1.0;
            Vec3::new(n, 0.0, 0.0)
        };
        assert_eq!(source.read_movement_input().x, 1.0);
        assert_eq!(source.read_movement_input().x, 2.0);
    }
}
