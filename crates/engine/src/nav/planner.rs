use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::path::{PathApply, PathResult};
use super::{step_toward, MotionResolver, NavigationQuery};
use crate::clock::Clock;
use crate::jobs::{panic_message, JobExecutor};
use crate::world::{Creature, EntityId, MovementType, Vec3};

pub const DEFAULT_KEEP_PATH_MS: u64 = 1_000;
pub const DEFAULT_WAYPOINT_REACH_DISTANCE_SQ: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Grace window during which a cached path is reused even if the
    /// requested destination moved.
    pub keep_path_ms: u64,
    pub waypoint_reach_distance_sq: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            keep_path_ms: DEFAULT_KEEP_PATH_MS,
            waypoint_reach_distance_sq: DEFAULT_WAYPOINT_REACH_DISTANCE_SQ,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerStats {
    pub jobs_dispatched: u64,
    pub path_reuse_ticks: u64,
    pub results_applied: u64,
    pub stale_results_discarded: u64,
    pub orphaned_results_discarded: u64,
    pub direct_line_fallbacks: u64,
}

pub struct PathPlanner {
    config: PlannerConfig,
    executor: Arc<dyn JobExecutor>,
    query: Arc<dyn NavigationQuery>,
    clock: Arc<dyn Clock>,
    motion: Box<dyn MotionResolver>,
    results_tx: Sender<PathResult>,
    results_rx: Receiver<PathResult>,
    stats: PlannerStats,
}

impl PathPlanner {
    pub fn new(
        config: PlannerConfig,
        executor: Arc<dyn JobExecutor>,
        query: Arc<dyn NavigationQuery>,
        clock: Arc<dyn Clock>,
        motion: Box<dyn MotionResolver>,
    ) -> Self {
        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            executor,
            query,
            clock,
            motion,
            results_tx,
            results_rx,
            stats: PlannerStats::default(),
        }
    }

    pub fn config(&self) -> PlannerConfig {
        self.config
    }

    pub fn stats(&self) -> PlannerStats {
        self.stats
    }

    /// Steers `creature` toward `destination` for one tick. Returns `true` once
    /// the squared planar distance is within `arrival_distance`.
    pub fn navigate(
        &mut self,
        creature: &mut Creature,
        destination: Vec3,
        arrival_distance: f32,
        dt: f32,
    ) -> bool {
        let distance_sq = creature.position.planar_distance_sq(destination);
        if distance_sq <= arrival_distance {
            creature.movement_type = MovementType::Idle;
            return true;
        }

        let now_ms = self.clock.now_ms();
        let keep_path_ms = self.config.keep_path_ms;
        let reusable = creature.path.path().is_some_and(|path| {
            path.destination == destination
                || now_ms.saturating_sub(path.computed_at_ms) <= keep_path_ms
        });

        if reusable {
            self.stats.path_reuse_ticks = self.stats.path_reuse_ticks.saturating_add(1);
            self.advance_on_path(creature, dt);
        } else {
            self.request_path(creature, destination);
        }
        false
    }

    pub fn advance_on_path(&mut self, creature: &mut Creature, dt: f32) {
        let Some(path) = creature.path.path() else {
            return;
        };
        let target = path.current_target();
        let exhausted = path.is_exhausted();

        // Once only the destination is left there is nothing to skip to, so
        // keep walking instead of stalling inside the reach radius.
        if !exhausted
            && creature.position.planar_distance_sq(target)
                <= self.config.waypoint_reach_distance_sq
        {
            if let Some(path) = creature.path.path_mut() {
                path.advance_cursor();
            }
            return;
        }

        let max_step = creature.run_speed * dt;
        let (candidate, reaches_target) = step_toward(creature.position, target, max_step);
        let Some(resolved) = self
            .motion
            .resolve_step(creature.id, creature.position, candidate)
        else {
            creature.movement_type = MovementType::Idle;
            return;
        };

        if resolved != creature.position {
            creature.face_towards(target);
            creature.position = resolved;
            creature.movement_type = MovementType::Run;
        } else {
            creature.movement_type = MovementType::Idle;
        }
        if reaches_target && resolved == candidate {
            if let Some(path) = creature.path.path_mut() {
                path.advance_cursor();
            }
        }
    }

    /// Dispatches a background query unless one is already in flight for
    /// this creature.
    pub fn request_path(&mut self, creature: &mut Creature, destination: Vec3) {
        let Some(generation) = creature.path.begin_request() else {
            return;
        };

        let creature_id = creature.id;
        let origin = creature.position;
        let query = Arc::clone(&self.query);
        let clock = Arc::clone(&self.clock);
        let results_tx = self.results_tx.clone();

        self.stats.jobs_dispatched = self.stats.jobs_dispatched.saturating_add(1);
        debug!(
            creature = creature_id.0,
            generation,
            origin_x = origin.x,
            origin_y = origin.y,
            destination_x = destination.x,
            destination_y = destination.y,
            "path_job_dispatched"
        );

        self.executor.enqueue(Box::new(move |liveness| {
            if !liveness.is_alive() {
                return;
            }
            let waypoints = run_query(query.as_ref(), creature_id, origin, destination);
            if !liveness.is_alive() {
                return;
            }

            let direct_line_fallback = waypoints.is_empty();
            let waypoints = if direct_line_fallback {
                vec![destination]
            } else {
                waypoints
            };
            let result = PathResult {
                creature_id,
                generation,
                destination,
                waypoints,
                computed_at_ms: clock.now_ms(),
                direct_line_fallback,
            };
            if results_tx.send(result).is_err() {
                debug!(creature = creature_id.0, "path_result_receiver_gone");
            }
        }));
    }

    /// Applies every result the workers have published since the last call.
    pub fn apply_completed_paths(&mut self, creatures: &mut BTreeMap<EntityId, Creature>) {
        for result in self.results_rx.try_iter() {
            let creature_id = result.creature_id;
            let generation = result.generation;
            let fallback = result.direct_line_fallback;
            let Some(creature) = creatures.get_mut(&creature_id) else {
                self.stats.orphaned_results_discarded =
                    self.stats.orphaned_results_discarded.saturating_add(1);
                debug!(creature = creature_id.0, "orphaned_path_result_discarded");
                continue;
            };

            match creature.path.apply(result) {
                PathApply::Applied => {
                    self.stats.results_applied = self.stats.results_applied.saturating_add(1);
                    if fallback {
                        self.stats.direct_line_fallbacks =
                            self.stats.direct_line_fallbacks.saturating_add(1);
                        debug!(creature = creature_id.0, "path_direct_line_fallback");
                    }
                }
                PathApply::Stale => {
                    self.stats.stale_results_discarded =
                        self.stats.stale_results_discarded.saturating_add(1);
                    debug!(
                        creature = creature_id.0,
                        generation,
                        current_generation = creature.path.generation(),
                        "stale_path_result_discarded"
                    );
                }
            }
        }
    }
}

fn run_query(
    query: &dyn NavigationQuery,
    creature_id: EntityId,
    origin: Vec3,
    destination: Vec3,
) -> Vec<Vec3> {
    match panic::catch_unwind(AssertUnwindSafe(|| query.find_path(origin, destination))) {
        Ok(points) => points,
        Err(payload) => {
            warn!(
                creature = creature_id.0,
                panic = %panic_message(payload.as_ref()),
                "navigation_query_panicked"
            );
            Vec::new()
        }
    }
}
