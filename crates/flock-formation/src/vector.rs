//! Cartesian offsets in centimeters.
//!
//! Formation tables and the swarm origin share one frame: `x` is the
//! east/north axis depending on the active [`Convention`](crate::Convention),
//! `y` the other horizontal axis, `z` the vertical.

use std::ops::{Add, Neg, Sub};

/// A position or offset in 3D space, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Origin of the coordinate system.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Whether every axis rounds to zero whole centimeters.
    pub fn is_negligible(&self) -> bool {
        round_cm(self.x) == 0 && round_cm(self.y) == 0 && round_cm(self.z) == 0
    }
}

/// Round a distance to whole centimeters.
pub fn round_cm(value: f64) -> i64 {
    value.round() as i64
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Neg for Vec3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_negligible() {
        assert!(Vec3::ZERO.is_negligible());
        assert!(Vec3::new(0.4, -0.4, 0.0).is_negligible());
        assert!(!Vec3::new(0.0, 0.0, 0.6).is_negligible());
    }

    #[test]
    fn rounding_is_to_nearest() {
        assert_eq!(round_cm(29.5), 30);
        assert_eq!(round_cm(-29.5), -30);
        assert_eq!(round_cm(12.2), 12);
    }

    #[test]
    fn addition_subtraction() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, -1.0, 2.0);

        assert_eq!(a + b, Vec3::new(5.0, 1.0, 5.0));
        assert_eq!(a - b, Vec3::new(-3.0, 3.0, 1.0));
        assert_eq!(a + (-b), a - b);
    }
}
