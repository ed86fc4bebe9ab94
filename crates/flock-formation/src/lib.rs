//! Flock Formation Geometry
//!
//! Deterministic mapping from named shapes to per-node move commands.
//!
//! # Model
//!
//! A swarm shares one origin and one coordinate [`Convention`]. A [`Shape`]
//! is a sequence of keyframes; each keyframe places every node at a waypoint
//! relative to the origin. The generator turns each node's delta into at most
//! three single-axis [`Step`]s (or one curve for [`Shape::Circle`]).
//!
//! Everything here is pure: no I/O, no clocks, no randomness.

mod convention;
mod error;
mod polygon;
mod shape;
mod vector;

pub use convention::{steps_for, Convention, Direction, Step};
pub use error::{FormationError, Result};
pub use polygon::{
    exterior_angle, polygon, PolygonLeg, Rotation, MAX_POLYGON_SIDES, POLYGON_EDGE,
};
pub use shape::{
    plan, waypoint, Keyframe, Maneuver, Shape, SwarmOrigin, CIRCLE_BASE_RADIUS,
    CIRCLE_RADIUS_STEP, FORMATION_SIZE,
};
pub use vector::{round_cm, Vec3};
