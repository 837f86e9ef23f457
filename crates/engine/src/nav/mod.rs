mod path;
mod planner;

pub use path::{Path, PathApply, PathResult, PathState};
pub use planner::{PathPlanner, PlannerConfig, PlannerStats};

use crate::world::{EntityId, Vec3};

/// Converts an origin/destination pair into an ordered route. An empty result
/// means no route was found.
pub trait NavigationQuery: Send + Sync {
    fn find_path(&self, origin: Vec3, destination: Vec3) -> Vec<Vec3>;
}

/// Query that never produces intermediate points; creatures head straight
/// for their destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectNavigation;

impl NavigationQuery for DirectNavigation {
    fn find_path(&self, _origin: Vec3, _destination: Vec3) -> Vec<Vec3> {
        Vec::new()
    }
}

/// Decides where a single motion step actually ends. `None` means the mover
/// is blocked and stays put.
pub trait MotionResolver {
    fn resolve_step(&self, mover: EntityId, from: Vec3, to: Vec3) -> Option<Vec3>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Unobstructed;

impl MotionResolver for Unobstructed {
    fn resolve_step(&self, _mover: EntityId, _from: Vec3, to: Vec3) -> Option<Vec3> {
        Some(to)
    }
}

/// Moves `current` up to `max_step` toward `target` on the ground plane.
/// Returns the new position and whether `target` was reached.
pub(crate) fn step_toward(current: Vec3, target: Vec3, max_step: f32) -> (Vec3, bool) {
    let distance_sq = current.planar_distance_sq(target);
    if distance_sq <= f32::EPSILON {
        return (target, true);
    }

    let distance = distance_sq.sqrt();
    if max_step >= distance {
        return (target, true);
    }

    let ratio = max_step.max(0.0) / distance;
    (
        Vec3 {
            x: current.x + (target.x - current.x) * ratio,
            y: current.y + (target.y - current.y) * ratio,
            z: current.z + (target.z - current.z) * ratio,
        },
        false,
    )
}
