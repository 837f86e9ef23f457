mod area;
mod simulation;

pub use area::Area;
pub use simulation::{SimCounters, Simulation};

use std::collections::BTreeMap;

use crate::actions::ActionStack;
use crate::nav::PathState;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn planar(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Squared distance on the ground plane; `z` is ignored.
    pub fn planar_distance_sq(self, other: Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovementType {
    #[default]
    Idle,
    Run,
}

#[derive(Debug)]
pub struct Creature {
    pub id: EntityId,
    pub tag: String,
    pub position: Vec3,
    pub facing_radians: f32,
    pub run_speed: f32,
    pub movement_type: MovementType,
    pub actions: ActionStack,
    pub path: PathState,
}

impl Creature {
    pub fn new(id: EntityId, tag: impl Into<String>, position: Vec3, run_speed: f32) -> Self {
        Self {
            id,
            tag: tag.into(),
            position,
            facing_radians: 0.0,
            run_speed,
            movement_type: MovementType::Idle,
            actions: ActionStack::default(),
            path: PathState::default(),
        }
    }

    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    pub(crate) fn face_towards(&mut self, target: Vec3) {
        let dx = target.x - self.position.x;
        let dy = target.y - self.position.y;
        if dx * dx + dy * dy > f32::EPSILON {
            self.facing_radians = dy.atan2(dx);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub id: EntityId,
    pub tag: String,
    pub position: Vec3,
}

pub(crate) fn object_position(
    creatures: &BTreeMap<EntityId, Creature>,
    waypoints: &BTreeMap<EntityId, Waypoint>,
    id: EntityId,
) -> Option<Vec3> {
    creatures
        .get(&id)
        .map(|creature| creature.position)
        .or_else(|| waypoints.get(&id).map(|waypoint| waypoint.position))
}

#[derive(Debug, Default)]
pub(crate) struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}


#[cfg(test)]
mod primitive_tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_vertical_axis() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 100.0);
        assert_eq!(a.planar_distance_sq(b), 25.0);
    }

    #[test]
    fn face_towards_keeps_heading_for_zero_length_target() {
        let mut creature = Creature::new(EntityId(1), "c", Vec3::planar(1.0, 1.0), 5.0);
        creature.facing_radians = 0.5;
        creature.face_towards(Vec3::planar(1.0, 1.0));
        assert_eq!(creature.facing_radians, 0.5);

        creature.face_towards(Vec3::planar(1.0, 2.0));
        assert!((creature.facing_radians - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }
}
