use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::SimMetricsHandle;
use crate::world::Simulation;

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub max_run_duration: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_run_duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    TimeLimit,
}

/// Drives `simulation` at a fixed tick rate until `should_stop` returns
/// `true` after a batch of ticks, or the configured run duration elapses.
pub fn run_simulation(
    config: &LoopConfig,
    simulation: &mut Simulation,
    metrics_handle: &SimMetricsHandle,
    mut should_stop: impl FnMut(&Simulation) -> bool,
) -> LoopExit {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        max_run_ms = config.max_run_duration.map(|limit| limit.as_millis() as u64),
        "loop_config"
    );

    let started = Instant::now();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = started;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval, started);

    loop {
        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
        accumulator = accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let tick_start = Instant::now();
            simulation.update(fixed_dt_seconds);
            metrics_accumulator.record_tick(Instant::now().saturating_duration_since(tick_start));
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now, simulation.counters()) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                creature_count = snapshot.creature_count,
                path_jobs_dispatched = snapshot.path_jobs_dispatched,
                path_results_applied = snapshot.path_results_applied,
                stale_path_results = snapshot.stale_path_results,
                actions_completed = snapshot.actions_completed,
                actions_aborted = snapshot.actions_aborted,
                script_failures = snapshot.script_failures,
                "loop_metrics"
            );
        }

        if step_plan.ticks_to_run > 0 && should_stop(simulation) {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "loop_stopped"
            );
            return LoopExit::Stopped;
        }

        let elapsed = Instant::now().saturating_duration_since(started);
        if config
            .max_run_duration
            .is_some_and(|limit| elapsed >= limit)
        {
            info!(elapsed_ms = elapsed.as_millis() as u64, "loop_time_limit_reached");
            return LoopExit::TimeLimit;
        }

        let idle = compute_idle_sleep(accumulator, fixed_dt);
        if idle > Duration::ZERO {
            thread::sleep(idle);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Time left until the accumulator holds another full tick.
fn compute_idle_sleep(accumulator: Duration, fixed_dt: Duration) -> Duration {
    fixed_dt.saturating_sub(accumulator)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actions::Action;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::jobs::ManualExecutor;
    use crate::nav::DirectNavigation;
    use crate::script::NullScriptRunner;
    use crate::world::Vec3;

    fn manual_simulation() -> Simulation {
        Simulation::new(
            EngineConfig::default(),
            Arc::new(ManualExecutor::new()),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn zero_durations_fall_back() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), Duration::from_secs(1)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn idle_sleep_is_zero_once_a_tick_is_due() {
        let fixed_dt = Duration::from_millis(16);
        assert_eq!(
            compute_idle_sleep(Duration::from_millis(20), fixed_dt),
            Duration::ZERO
        );
        assert_eq!(
            compute_idle_sleep(Duration::from_millis(6), fixed_dt),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn stops_once_predicate_holds_after_ticks() {
        let mut simulation = manual_simulation();
        let area = simulation.build_area(
            "test_area",
            Arc::new(DirectNavigation),
            Box::new(NullScriptRunner),
        );
        simulation.transition_to(area);
        let area = simulation.area_mut().expect("area loaded");
        let id = area.spawn_creature("walker", Vec3::planar(0.0, 0.0));
        area.push_action(id, Action::start_conversation("greeting"));

        let config = LoopConfig {
            target_tps: 200,
            max_run_duration: Some(Duration::from_secs(5)),
            ..LoopConfig::default()
        };
        let exit = run_simulation(
            &config,
            &mut simulation,
            &SimMetricsHandle::default(),
            |simulation| {
                simulation
                    .area()
                    .is_some_and(|area| !area.has_pending_actions())
            },
        );

        assert_eq!(exit, LoopExit::Stopped);
        assert!(simulation.area().is_some_and(|area| area.tick_count() >= 1));
    }

    #[test]
    fn time_limit_ends_loop_without_area() {
        let mut simulation = manual_simulation();
        let config = LoopConfig {
            target_tps: 200,
            max_run_duration: Some(Duration::from_millis(30)),
            ..LoopConfig::default()
        };

        let exit = run_simulation(&config, &mut simulation, &SimMetricsHandle::default(), |_| {
            false
        });

        assert_eq!(exit, LoopExit::TimeLimit);
    }
}
