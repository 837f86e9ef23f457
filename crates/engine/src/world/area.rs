use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{object_position, Creature, EntityId, EntityIdAllocator, MovementType, Vec3, Waypoint};
use crate::actions::{Action, ActionProcessor};
use crate::nav::PathPlanner;

pub struct Area {
    name: String,
    ids: EntityIdAllocator,
    creatures: BTreeMap<EntityId, Creature>,
    waypoints: BTreeMap<EntityId, Waypoint>,
    planner: PathPlanner,
    processor: ActionProcessor,
    default_run_speed: f32,
    tick_count: u64,
}

impl Area {
    pub fn new(
        name: impl Into<String>,
        planner: PathPlanner,
        processor: ActionProcessor,
        default_run_speed: f32,
    ) -> Self {
        Self {
            name: name.into(),
            ids: EntityIdAllocator::default(),
            creatures: BTreeMap::new(),
            waypoints: BTreeMap::new(),
            planner,
            processor,
            default_run_speed,
            tick_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn spawn_creature(&mut self, tag: impl Into<String>, position: Vec3) -> EntityId {
        self.spawn_creature_with_speed(tag, position, self.default_run_speed)
    }

    pub fn spawn_creature_with_speed(
        &mut self,
        tag: impl Into<String>,
        position: Vec3,
        run_speed: f32,
    ) -> EntityId {
        let id = self.ids.allocate();
        let creature = Creature::new(id, tag, position, run_speed);
        debug!(area = self.name.as_str(), creature = id.0, tag = creature.tag.as_str(), "creature_spawned");
        self.creatures.insert(id, creature);
        id
    }

    pub fn spawn_waypoint(&mut self, tag: impl Into<String>, position: Vec3) -> EntityId {
        let id = self.ids.allocate();
        self.waypoints.insert(
            id,
            Waypoint {
                id,
                tag: tag.into(),
                position,
            },
        );
        id
    }

    /// Removes a creature or waypoint. Path results still in flight for a
    /// removed creature are dropped when they arrive.
    pub fn remove_object(&mut self, id: EntityId) -> bool {
        let removed =
            self.creatures.remove(&id).is_some() || self.waypoints.remove(&id).is_some();
        if removed {
            debug!(area = self.name.as_str(), object = id.0, "object_removed");
        }
        removed
    }

    pub fn creature(&self, id: EntityId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn creature_mut(&mut self, id: EntityId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn waypoint(&self, id: EntityId) -> Option<&Waypoint> {
        self.waypoints.get(&id)
    }

    /// Lowest-id creature with `tag`, falling back to waypoints.
    pub fn find_by_tag(&self, tag: &str) -> Option<EntityId> {
        self.creatures
            .values()
            .find(|creature| creature.tag == tag)
            .map(|creature| creature.id)
            .or_else(|| {
                self.waypoints
                    .values()
                    .find(|waypoint| waypoint.tag == tag)
                    .map(|waypoint| waypoint.id)
            })
    }

    pub fn object_position(&self, id: EntityId) -> Option<Vec3> {
        object_position(&self.creatures, &self.waypoints, id)
    }

    /// Interrupts the current action. A pushed movement action drops the
    /// cached route so a query still running for the old destination comes
    /// back stale.
    pub fn push_action(&mut self, id: EntityId, action: Action) -> bool {
        let Some(creature) = self.creatures.get_mut(&id) else {
            return false;
        };
        if action.is_movement() {
            creature.path.discard();
        }
        creature.actions.push(action);
        true
    }

    pub fn queue_action(&mut self, id: EntityId, action: Action) -> bool {
        let Some(creature) = self.creatures.get_mut(&id) else {
            return false;
        };
        creature.actions.queue(action);
        true
    }

    pub fn clear_actions(&mut self, id: EntityId) -> bool {
        let Some(creature) = self.creatures.get_mut(&id) else {
            return false;
        };
        creature.actions.clear();
        creature.path.discard();
        creature.movement_type = MovementType::Idle;
        true
    }

    pub fn has_pending_actions(&self) -> bool {
        self.creatures.values().any(Creature::has_actions)
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    pub fn processor(&self) -> &ActionProcessor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut ActionProcessor {
        &mut self.processor
    }

    /// One simulation tick: publish finished routes, then run every
    /// creature's current action.
    pub fn update(&mut self, dt: f32) {
        let Self {
            creatures,
            waypoints,
            planner,
            processor,
            tick_count,
            ..
        } = self;
        planner.apply_completed_paths(creatures);
        processor.update(creatures, waypoints, planner, dt);
        *tick_count = tick_count.saturating_add(1);
    }

    /// Called once the job executor has been drained. Results that finished
    /// before cancellation are still applied; requests that never will
    /// report back are forgotten so their creatures can ask again.
    pub fn settle_after_drain(&mut self) {
        self.planner.apply_completed_paths(&mut self.creatures);
        let mut reset = 0usize;
        for creature in self.creatures.values_mut() {
            if creature.path.is_update_pending() {
                creature.path.reset_pending();
                reset = reset.saturating_add(1);
            }
        }
        info!(area = self.name.as_str(), reset, "path_requests_settled");
    }
}
