//! Coordinate conventions and single-axis move steps.
//!
//! A delta is flown as at most three single-axis moves. The axis order and
//! sign interpretation depend on the convention:
//!
//! - ENU: `y` forward/back, then `x` right/left, then `z` up/down.
//! - NED: `x` forward/back, then `y` right/left, then `z` down/up.

use std::str::FromStr;

use crate::error::FormationError;
use crate::vector::{round_cm, Vec3};

/// Axis interpretation used when turning deltas into moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Convention {
    /// East-North-Up.
    #[default]
    Enu,
    /// North-East-Down.
    Ned,
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enu => write!(f, "ENU"),
            Self::Ned => write!(f, "NED"),
        }
    }
}

impl FromStr for Convention {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enu" => Ok(Self::Enu),
            "ned" => Ok(Self::Ned),
            other => Err(FormationError::UnknownConvention(other.to_string())),
        }
    }
}

/// Body-relative move direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// SDK keyword for this direction.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// One single-axis move of a whole number of centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Step {
    pub direction: Direction,
    pub distance: u32,
}

impl Step {
    pub const fn new(direction: Direction, distance: u32) -> Self {
        Self { direction, distance }
    }

    /// Signed step along one axis. Zero yields no step.
    fn along(value: f64, positive: Direction, negative: Direction) -> Option<Self> {
        let cm = round_cm(value);
        if cm == 0 {
            return None;
        }
        let direction = if cm > 0 { positive } else { negative };
        Some(Self::new(direction, cm.unsigned_abs() as u32))
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.direction.keyword(), self.distance)
    }
}

/// Convert a delta into ordered single-axis steps under `convention`.
///
/// Axes with a zero (rounded) component emit nothing.
pub fn steps_for(delta: Vec3, convention: Convention) -> Vec<Step> {
    use Direction::*;

    let axes = match convention {
        Convention::Enu => [
            Step::along(delta.y, Forward, Back),
            Step::along(delta.x, Right, Left),
            Step::along(delta.z, Up, Down),
        ],
        Convention::Ned => [
            Step::along(delta.x, Forward, Back),
            Step::along(delta.y, Right, Left),
            Step::along(delta.z, Down, Up),
        ],
    };

    axes.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(steps: &[Step]) -> Vec<String> {
        steps.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn enu_orders_forward_then_lateral_then_vertical() {
        let steps = steps_for(Vec3::new(-30.0, 30.0, 20.0), Convention::Enu);
        assert_eq!(rendered(&steps), vec!["forward 30", "left 30", "up 20"]);
    }

    #[test]
    fn ned_flips_vertical_sign() {
        let steps = steps_for(Vec3::new(40.0, -25.0, 30.0), Convention::Ned);
        assert_eq!(rendered(&steps), vec!["forward 40", "left 25", "down 30"]);

        let steps = steps_for(Vec3::new(0.0, 0.0, -30.0), Convention::Ned);
        assert_eq!(rendered(&steps), vec!["up 30"]);
    }

    #[test]
    fn zero_axes_emit_nothing() {
        assert!(steps_for(Vec3::ZERO, Convention::Enu).is_empty());
        assert!(steps_for(Vec3::new(0.2, -0.3, 0.0), Convention::Ned).is_empty());

        let steps = steps_for(Vec3::new(0.0, -30.0, 0.0), Convention::Enu);
        assert_eq!(rendered(&steps), vec!["back 30"]);
    }

    #[test]
    fn parses_convention_names() {
        assert_eq!("enu".parse::<Convention>().unwrap(), Convention::Enu);
        assert_eq!(" NED ".parse::<Convention>().unwrap(), Convention::Ned);
        assert!("xyz".parse::<Convention>().is_err());
    }
}
