//! Regular polygons flown independently by every node.

use crate::convention::{Direction, Step};
use crate::error::{FormationError, Result};

/// Edge length used by the `poly` command, in centimeters.
pub const POLYGON_EDGE: u32 = 25;

/// Most sides a `poly` may have; beyond this the turn rounds below one degree.
pub const MAX_POLYGON_SIDES: u32 = 360;

/// Counter-clockwise yaw in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rotation {
    pub degrees: u32,
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ccw {}", self.degrees)
    }
}

/// One edge of a polygon: advance, then turn by the exterior angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolygonLeg {
    pub advance: Step,
    pub turn: Rotation,
}

/// Exterior turn angle of a regular polygon, rounded to whole degrees.
pub fn exterior_angle(sides: u32) -> u32 {
    (360.0 / f64::from(sides)).round() as u32
}

/// Legs approximating a regular polygon with `sides` edges of `edge` cm.
pub fn polygon(sides: u32, edge: u32) -> Result<Vec<PolygonLeg>> {
    if sides < 3 {
        return Err(FormationError::TooFewSides(sides));
    }
    if sides > MAX_POLYGON_SIDES {
        return Err(FormationError::TooManySides {
            sides,
            max: MAX_POLYGON_SIDES,
        });
    }
    let leg = PolygonLeg {
        advance: Step::new(Direction::Forward, edge),
        turn: Rotation {
            degrees: exterior_angle(sides),
        },
    };
    Ok(vec![leg; sides as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_turns_ninety() {
        let legs = polygon(4, POLYGON_EDGE).unwrap();
        assert_eq!(legs.len(), 4);
        for leg in legs {
            assert_eq!(leg.advance.to_string(), "forward 25");
            assert_eq!(leg.turn.to_string(), "ccw 90");
        }
    }

    #[test]
    fn angles_round_to_nearest_degree() {
        assert_eq!(exterior_angle(7), 51);
        assert_eq!(exterior_angle(9), 40);
        assert_eq!(exterior_angle(11), 33);
    }

    #[test]
    fn degenerate_polygons_are_rejected() {
        assert_eq!(polygon(2, POLYGON_EDGE), Err(FormationError::TooFewSides(2)));
        assert_eq!(polygon(0, POLYGON_EDGE), Err(FormationError::TooFewSides(0)));
    }

    #[test]
    fn side_count_is_bounded() {
        assert_eq!(polygon(MAX_POLYGON_SIDES, POLYGON_EDGE).unwrap().len(), 360);
        assert_eq!(
            polygon(4_000_000_000, POLYGON_EDGE),
            Err(FormationError::TooManySides {
                sides: 4_000_000_000,
                max: MAX_POLYGON_SIDES
            })
        );
    }
}
