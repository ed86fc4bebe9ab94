//! Named formations and their keyframe tables.
//!
//! A formation is an ordered list of keyframes. Each table row holds one
//! offset per node; a node's waypoint after keyframe `k` is the swarm origin
//! plus the sum of its offsets up to `k`. Every node starts at the zero of
//! the frame (where it currently hovers), so its first move carries it to
//! the origin as well as through the first offset.
//!
//! The keyframes are flown one after another; every node receives its moves
//! for keyframe `k` before any node receives moves for keyframe `k + 1`.
//!
//! The tables are authored for a three-node swarm. The offsets of every
//! node sum to zero, so each node finishes on the origin.

use crate::convention::{steps_for, Convention, Step};
use crate::error::{FormationError, Result};
use crate::vector::Vec3;

/// Number of nodes the built-in tables are authored for.
pub const FORMATION_SIZE: usize = 3;

/// Base radius of the circle maneuver, in centimeters.
pub const CIRCLE_BASE_RADIUS: f64 = 60.0;

/// Radius added per node index so circles do not intersect.
pub const CIRCLE_RADIUS_STEP: f64 = 40.0;

const fn v(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Rise into a vertical column, shift back, and settle.
const VERTICAL: [[Vec3; FORMATION_SIZE]; 4] = [
    [v(-30.0, 30.0, 0.0), v(0.0, 30.0, 0.0), v(30.0, 30.0, 0.0)],
    [v(0.0, 0.0, 30.0), v(0.0, 0.0, 60.0), v(0.0, 0.0, 90.0)],
    [v(0.0, -30.0, 0.0), v(0.0, -30.0, 0.0), v(0.0, -30.0, 0.0)],
    [v(30.0, 0.0, -30.0), v(0.0, 0.0, -60.0), v(-30.0, 0.0, -90.0)],
];

/// Staggered rise and fall rolling across the line.
const WAVE: [[Vec3; FORMATION_SIZE]; 3] = [
    [v(0.0, 0.0, 30.0), v(0.0, 0.0, 0.0), v(0.0, 0.0, -30.0)],
    [v(0.0, 0.0, -30.0), v(0.0, 0.0, 30.0), v(0.0, 0.0, 0.0)],
    [v(0.0, 0.0, 0.0), v(0.0, 0.0, -30.0), v(0.0, 0.0, 30.0)],
];

/// Apex forward, wings out, then collapse back.
const TRIANGLE: [[Vec3; FORMATION_SIZE]; 2] = [
    [v(0.0, 50.0, 0.0), v(-40.0, 0.0, 0.0), v(40.0, 0.0, 0.0)],
    [v(0.0, -50.0, 0.0), v(40.0, 0.0, 0.0), v(-40.0, 0.0, 0.0)],
];

/// Diagonal spread around the middle node, then return.
const HORIZONTAL: [[Vec3; FORMATION_SIZE]; 2] = [
    [v(-50.0, 50.0, 0.0), v(0.0, 0.0, 0.0), v(50.0, -50.0, 0.0)],
    [v(50.0, -50.0, 0.0), v(0.0, 0.0, 0.0), v(-50.0, 50.0, 0.0)],
];

/// A named formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Vertical,
    Wave,
    Triangle,
    Circle,
    Horizontal,
}

impl Shape {
    /// All shapes, in DSL matching order.
    pub const ALL: [Self; 5] = [
        Self::Vertical,
        Self::Wave,
        Self::Triangle,
        Self::Circle,
        Self::Horizontal,
    ];

    /// DSL keyword for this shape.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Wave => "wave",
            Self::Triangle => "triangle",
            Self::Circle => "circle",
            Self::Horizontal => "horizontal",
        }
    }

    /// Number of keyframes flown for this shape.
    pub fn keyframe_count(&self) -> usize {
        match self {
            Self::Vertical => VERTICAL.len(),
            Self::Wave => WAVE.len(),
            Self::Triangle => TRIANGLE.len(),
            Self::Horizontal => HORIZONTAL.len(),
            Self::Circle => 1,
        }
    }

    fn table(&self) -> &'static [[Vec3; FORMATION_SIZE]] {
        match self {
            Self::Vertical => &VERTICAL,
            Self::Wave => &WAVE,
            Self::Triangle => &TRIANGLE,
            Self::Horizontal => &HORIZONTAL,
            Self::Circle => &[],
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared reference frame for formation generation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwarmOrigin {
    pub position: Vec3,
    pub convention: Convention,
}

impl SwarmOrigin {
    pub const fn new(position: Vec3, convention: Convention) -> Self {
        Self { position, convention }
    }
}

/// What one node flies during one keyframe.
#[derive(Debug, Clone, PartialEq)]
pub enum Maneuver {
    /// Ordered single-axis moves. May be empty when the node holds position.
    Steps(Vec<Step>),
    /// A curved path through `entry` ending at `exit`, in the body frame
    /// (`x` forward, `y` lateral, `z` up).
    Curve { entry: Vec3, exit: Vec3 },
}

/// All nodes' maneuvers for one keyframe, indexed by node.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub index: usize,
    pub maneuvers: Vec<Maneuver>,
}

/// Absolute waypoint of `node_index` after `keyframe` of `shape`.
///
/// Pure function of the origin and swarm shape; returns `None` when the
/// keyframe does not exist or the shape has no waypoint table (circle).
pub fn waypoint(
    shape: Shape,
    origin: Vec3,
    node_count: usize,
    node_index: usize,
    keyframe: usize,
) -> Result<Option<Vec3>> {
    check_size(shape, node_count)?;
    let table = shape.table();
    if keyframe >= table.len() || node_index >= FORMATION_SIZE {
        return Ok(None);
    }
    Ok(Some(
        table[..=keyframe]
            .iter()
            .fold(origin, |at, row| at + row[node_index]),
    ))
}

/// Expand `shape` into per-keyframe, per-node maneuvers.
///
/// Each node's move for keyframe `k` is the difference between its waypoints
/// at `k` and `k - 1`, starting from the frame zero. A non-zero origin
/// therefore shifts the first keyframe's moves. Curves are flown in the body
/// frame and ignore the origin.
pub fn plan(shape: Shape, origin: &SwarmOrigin, node_count: usize) -> Result<Vec<Keyframe>> {
    check_size(shape, node_count)?;

    if shape == Shape::Circle {
        let maneuvers = (0..node_count)
            .map(|index| {
                let r = CIRCLE_BASE_RADIUS + CIRCLE_RADIUS_STEP * index as f64;
                let entry = Vec3::new(r, r, 0.0);
                let exit = Vec3::new(entry.x, -entry.y, entry.z);
                Maneuver::Curve { entry, exit }
            })
            .collect();
        return Ok(vec![Keyframe { index: 0, maneuvers }]);
    }

    let mut positions = vec![Vec3::ZERO; node_count];
    let mut frames = Vec::with_capacity(shape.keyframe_count());
    for index in 0..shape.keyframe_count() {
        let mut maneuvers = Vec::with_capacity(node_count);
        for (node, at) in positions.iter_mut().enumerate() {
            let target = waypoint(shape, origin.position, node_count, node, index)?
                .unwrap_or(*at);
            maneuvers.push(Maneuver::Steps(steps_for(target - *at, origin.convention)));
            *at = target;
        }
        frames.push(Keyframe { index, maneuvers });
    }
    Ok(frames)
}

fn check_size(shape: Shape, node_count: usize) -> Result<()> {
    if node_count != FORMATION_SIZE {
        return Err(FormationError::UnsupportedSwarmSize {
            shape: shape.name(),
            expected: FORMATION_SIZE,
            actual: node_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn steps(m: &Maneuver) -> Vec<String> {
        match m {
            Maneuver::Steps(s) => s.iter().map(ToString::to_string).collect(),
            Maneuver::Curve { .. } => panic!("expected steps"),
        }
    }

    #[test]
    fn vertical_node_zero_waypoints() {
        let waypoints: Vec<Vec3> = (0..4)
            .map(|k| waypoint(Shape::Vertical, Vec3::ZERO, 3, 0, k).unwrap().unwrap())
            .collect();
        assert_eq!(
            waypoints,
            vec![
                Vec3::new(-30.0, 30.0, 0.0),
                Vec3::new(-30.0, 30.0, 30.0),
                Vec3::new(-30.0, 0.0, 30.0),
                Vec3::ZERO,
            ]
        );
    }

    #[test]
    fn vertical_enu_moves_for_node_zero() {
        let frames = plan(Shape::Vertical, &SwarmOrigin::default(), 3).unwrap();
        assert_eq!(frames.len(), 4);
        let node0: Vec<Vec<String>> = frames.iter().map(|f| steps(&f.maneuvers[0])).collect();
        assert_eq!(
            node0,
            vec![
                vec!["forward 30".to_string(), "left 30".to_string()],
                vec!["up 30".to_string()],
                vec!["back 30".to_string()],
                vec!["right 30".to_string(), "down 30".to_string()],
            ]
        );
    }

    #[test]
    fn waypoints_follow_origin() {
        let origin = Vec3::new(100.0, -20.0, 80.0);
        let wp = waypoint(Shape::Triangle, origin, 3, 1, 0).unwrap().unwrap();
        assert_eq!(wp, Vec3::new(60.0, -20.0, 80.0));
        assert_eq!(waypoint(Shape::Triangle, origin, 3, 1, 1).unwrap(), Some(origin));
        assert_eq!(waypoint(Shape::Triangle, origin, 3, 1, 2).unwrap(), None);
    }

    #[test]
    fn home_shifts_the_first_keyframe() {
        let home = SwarmOrigin::new(Vec3::new(50.0, 0.0, 0.0), Convention::Enu);
        let frames = plan(Shape::Horizontal, &home, 3).unwrap();

        assert_eq!(steps(&frames[0].maneuvers[0]), vec!["forward 50"]);
        assert_eq!(steps(&frames[0].maneuvers[1]), vec!["right 50"]);
        assert_eq!(steps(&frames[0].maneuvers[2]), vec!["back 50", "right 100"]);
        // Later keyframes are relative to the formation, not to home.
        assert_eq!(steps(&frames[1].maneuvers[1]), Vec::<String>::new());
        assert_eq!(steps(&frames[1].maneuvers[0]), vec!["back 50", "right 50"]);
    }

    #[test]
    fn holding_nodes_get_empty_steps() {
        let frames = plan(Shape::Wave, &SwarmOrigin::default(), 3).unwrap();
        assert!(steps(&frames[0].maneuvers[1]).is_empty());
        assert_eq!(steps(&frames[0].maneuvers[2]), vec!["down 30"]);
    }

    #[test]
    fn circle_emits_one_mirrored_curve_per_node() {
        let frames = plan(Shape::Circle, &SwarmOrigin::default(), 3).unwrap();
        assert_eq!(frames.len(), 1);
        for (index, m) in frames[0].maneuvers.iter().enumerate() {
            match m {
                Maneuver::Curve { entry, exit } => {
                    let r = CIRCLE_BASE_RADIUS + CIRCLE_RADIUS_STEP * index as f64;
                    assert_eq!(*entry, Vec3::new(r, r, 0.0));
                    assert_eq!(*exit, Vec3::new(r, -r, 0.0));
                }
                Maneuver::Steps(_) => panic!("circle must emit curves"),
            }
        }
    }

    #[test]
    fn rejects_other_swarm_sizes() {
        for shape in Shape::ALL {
            let err = plan(shape, &SwarmOrigin::default(), 2).unwrap_err();
            assert!(matches!(err, FormationError::UnsupportedSwarmSize { actual: 2, .. }));
        }
    }

    proptest! {
        #[test]
        fn every_node_finishes_on_the_origin(
            node in 0usize..FORMATION_SIZE,
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
            z in 0.0f64..300.0,
        ) {
            let origin = Vec3::new(x, y, z);
            for shape in [Shape::Vertical, Shape::Wave, Shape::Triangle, Shape::Horizontal] {
                let last = shape.keyframe_count() - 1;
                let end = waypoint(shape, origin, 3, node, last).unwrap().unwrap();
                prop_assert!((end - origin).is_negligible(), "{} node {} ends at {}", shape, node, end);
            }
        }

        #[test]
        fn nonzero_home_changes_the_plan(x in 1.0f64..500.0, y in -500.0f64..500.0) {
            let home = SwarmOrigin::new(Vec3::new(x, y, 0.0), Convention::Ned);
            let zero = SwarmOrigin::new(Vec3::ZERO, Convention::Ned);
            for shape in [Shape::Vertical, Shape::Wave, Shape::Triangle, Shape::Horizontal] {
                let moved = plan(shape, &home, 3).unwrap();
                let fixed = plan(shape, &zero, 3).unwrap();
                prop_assert_ne!(&moved[0], &fixed[0]);
                prop_assert_eq!(&moved[1..], &fixed[1..]);
            }
        }
    }
}
