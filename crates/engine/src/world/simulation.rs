use std::sync::Arc;

use tracing::info;

use super::Area;
use crate::actions::{ActionProcessor, ActionStats};
use crate::clock::{Clock, MonotonicClock};
use crate::config::EngineConfig;
use crate::jobs::{JobExecutor, JobExecutorError, ThreadPoolExecutor};
use crate::nav::{MotionResolver, NavigationQuery, PathPlanner, PlannerStats, Unobstructed};
use crate::script::ScriptRunner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub creature_count: usize,
    pub planner: PlannerStats,
    pub actions: ActionStats,
}

/// Top-level context: owns the job executor handle, the clock and the
/// currently loaded area.
pub struct Simulation {
    config: EngineConfig,
    executor: Arc<dyn JobExecutor>,
    clock: Arc<dyn Clock>,
    area: Option<Area>,
}

impl Simulation {
    pub fn new(config: EngineConfig, executor: Arc<dyn JobExecutor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            executor,
            clock,
            area: None,
        }
    }

    pub fn with_thread_pool(config: EngineConfig) -> Result<Self, JobExecutorError> {
        let executor = ThreadPoolExecutor::new(config.worker_threads)?;
        Ok(Self::new(
            config,
            Arc::new(executor),
            Arc::new(MonotonicClock::default()),
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<dyn JobExecutor> {
        &self.executor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn build_area(
        &self,
        name: impl Into<String>,
        query: Arc<dyn NavigationQuery>,
        script_runner: Box<dyn ScriptRunner>,
    ) -> Area {
        self.build_area_with_motion(name, query, script_runner, Box::new(Unobstructed))
    }

    pub fn build_area_with_motion(
        &self,
        name: impl Into<String>,
        query: Arc<dyn NavigationQuery>,
        script_runner: Box<dyn ScriptRunner>,
        motion: Box<dyn MotionResolver>,
    ) -> Area {
        let planner = PathPlanner::new(
            self.config.planner,
            Arc::clone(&self.executor),
            query,
            Arc::clone(&self.clock),
            motion,
        );
        Area::new(
            name,
            planner,
            ActionProcessor::new(script_runner),
            self.config.default_run_speed,
        )
    }

    pub fn area(&self) -> Option<&Area> {
        self.area.as_ref()
    }

    pub fn area_mut(&mut self) -> Option<&mut Area> {
        self.area.as_mut()
    }

    pub fn update(&mut self, dt: f32) {
        if let Some(area) = self.area.as_mut() {
            area.update(dt);
        }
    }

    /// Cancels and awaits every outstanding job, then settles the loaded
    /// area so no creature waits on a query that was cancelled.
    pub fn drain_jobs(&mut self) {
        info!("awaiting_async_jobs");
        self.executor.cancel();
        self.executor.await_idle();
        if let Some(area) = self.area.as_mut() {
            area.settle_after_drain();
        }
    }

    /// Replaces the loaded area. Jobs are drained before the previous area
    /// is handed back to the caller.
    pub fn transition_to(&mut self, area: Area) -> Option<Area> {
        self.drain_jobs();
        let previous = self.area.replace(area);
        info!(
            from = previous.as_ref().map(Area::name).unwrap_or("<none>"),
            to = self.area.as_ref().map(Area::name).unwrap_or("<none>"),
            "area_transition"
        );
        previous
    }

    pub fn shutdown(&mut self) -> Option<Area> {
        self.drain_jobs();
        let area = self.area.take();
        info!(
            area = area.as_ref().map(Area::name).unwrap_or("<none>"),
            "simulation_shutdown"
        );
        area
    }

    pub fn counters(&self) -> SimCounters {
        self.area
            .as_ref()
            .map(|area| SimCounters {
                creature_count: area.creature_count(),
                planner: area.planner().stats(),
                actions: area.processor().stats(),
            })
            .unwrap_or_default()
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.area.is_some() {
            self.shutdown();
        }
    }
}
