//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics. Orientation helpers
//! treat `+Y` as up and `+Z` as forward.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).len()
    }

    /// Unit-length copy, or `ZERO` for a degenerate vector.
    pub fn normalize_or_zero(self) -> Self {
        let len = self.len();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Rotation quaternion.
///
/// Values coming off the wire are not normalization-checked; the
/// interpolation helpers below tolerate slightly denormalized input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Neg for Quat {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }
}

impl Quat {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `radians` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, radians: f32) -> Self {
        let (s, c) = (radians * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    pub fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len > f32::EPSILON {
            let inv = 1.0 / len;
            Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// Orientation whose forward (`+Z`) axis points along `forward`, keeping
    /// `up` as close to world up as possible.
    pub fn look_rotation(forward: Vec3, up: Vec3) -> Self {
        let f = forward.normalize_or_zero();
        if f == Vec3::ZERO {
            return Self::IDENTITY;
        }
        let mut r = up.cross(f).normalize_or_zero();
        if r == Vec3::ZERO {
            // Looking straight along `up`: any perpendicular right axis works.
            r = Vec3::new(1.0, 0.0, 0.0);
        }
        let u = f.cross(r);

        // Columns of the rotation matrix are (r, u, f).
        let (m00, m01, m02) = (r.x, u.x, f.x);
        let (m10, m11, m12) = (r.y, u.y, f.y);
        let (m20, m21, m22) = (r.z, u.z, f.z);
        let trace = m00 + m11 + m22;

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    /// Angle between two orientations in degrees.
    pub fn angle_deg(self, other: Self) -> f32 {
        let a = self.normalize();
        let b = other.normalize();
        let d = a.dot(b).abs().min(1.0);
        (2.0 * d.acos()).to_degrees()
    }

    /// Spherical interpolation along the shortest arc; `t` is clamped to `[0, 1]`.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let a = self.normalize();
        let mut b = to.normalize();
        let mut d = a.dot(b);
        if d < 0.0 {
            b = -b;
            d = -d;
        }

        if d > 0.9995 {
            // Nearly parallel: normalized lerp avoids dividing by ~0.
            return Self::new(
                a.x + (b.x - a.x) * t,
                a.y + (b.y - a.y) * t,
                a.z + (b.z - a.z) * t,
                a.w + (b.w - a.w) * t,
            )
            .normalize();
        }

        let theta0 = d.acos();
        let theta = theta0 * t;
        let sin0 = theta0.sin();
        let s1 = theta.sin() / sin0;
        let s0 = theta.cos() - d * s1;
        Self::new(
            a.x * s0 + b.x * s1,
            a.y * s0 + b.y * s1,
            a.z * s0 + b.z * s1,
            a.w * s0 + b.w * s1,
        )
    }

    /// Rotates toward `to` by at most `max_degrees`, never overshooting.
    pub fn rotate_towards(self, to: Self, max_degrees: f32) -> Self {
        let angle = self.angle_deg(to);
        if angle <= max_degrees {
            return to;
        }
        self.slerp(to, max_degrees / angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    /// Same rotation, allowing for the double cover and rounding.
    fn same_rotation(a: Quat, b: Quat) -> bool {
        a.normalize().dot(b.normalize()).abs() > 1.0 - 1e-5
    }

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        assert_eq!(Vec3::ZERO.normalize_or_zero(), Vec3::ZERO);
        let n = Vec3::new(3.0, 0.0, 4.0).normalize_or_zero();
        assert!(approx(n.len(), 1.0));
    }

    #[test]
    fn look_rotation_forward_is_identity() {
        let q = Quat::look_rotation(Vec3::FORWARD, Vec3::UP);
        assert!(same_rotation(q, Quat::IDENTITY));
    }

    #[test]
    fn look_rotation_right_is_quarter_turn_about_y() {
        let q = Quat::look_rotation(Vec3::new(1.0, 0.0, 0.0), Vec3::UP);
        let expected = Quat::from_axis_angle(Vec3::UP, std::f32::consts::FRAC_PI_2);
        assert!(same_rotation(q, expected), "{q:?}");
    }

    #[test]
    fn rotate_towards_is_capped_and_does_not_overshoot() {
        let target = Quat::from_axis_angle(Vec3::UP, std::f32::consts::PI / 2.0);
        let step = Quat::IDENTITY.rotate_towards(target, 30.0);
        assert!((Quat::IDENTITY.angle_deg(step) - 30.0).abs() < 0.05);

        let done = Quat::IDENTITY.rotate_towards(target, 720.0);
        assert_eq!(done, target);
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = Quat::IDENTITY;
        let b = -Quat::from_axis_angle(Vec3::UP, 0.5);
        let mid = a.slerp(b, 0.5);
        let expected = Quat::from_axis_angle(Vec3::UP, 0.25);
        assert!(same_rotation(mid, expected), "{mid:?}");
    }
}
