use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::world::SimCounters;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimMetricsSnapshot {
    pub tps: f32,
    pub tick_time_ms: f32,
    pub creature_count: usize,
    pub path_jobs_dispatched: u64,
    pub path_reuse_ticks: u64,
    pub path_results_applied: u64,
    pub stale_path_results: u64,
    pub direct_line_fallbacks: u64,
    pub actions_completed: u64,
    pub actions_aborted: u64,
    pub actions_unsupported: u64,
    pub script_failures: u64,
}

/// Shared read side of the loop metrics; cloned into whatever wants to
/// observe the simulation while it runs.
#[derive(Clone, Debug)]
pub struct SimMetricsHandle {
    snapshot: Arc<RwLock<SimMetricsSnapshot>>,
}

impl Default for SimMetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(SimMetricsSnapshot::default())),
        }
    }
}

impl SimMetricsHandle {
    pub fn snapshot(&self) -> SimMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: SimMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    tick_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            ticks: 0,
            tick_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_tick(&mut self, tick_time: Duration) {
        self.ticks = self.ticks.saturating_add(1);
        self.tick_time_sum = self.tick_time_sum.saturating_add(tick_time);
    }

    pub(crate) fn maybe_snapshot(
        &mut self,
        now: Instant,
        counters: SimCounters,
    ) -> Option<SimMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let tick_time_ms = if self.ticks == 0 {
            0.0
        } else {
            (self.tick_time_sum.as_secs_f32() / self.ticks as f32) * 1000.0
        };

        let snapshot = SimMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            tick_time_ms,
            creature_count: counters.creature_count,
            path_jobs_dispatched: counters.planner.jobs_dispatched,
            path_reuse_ticks: counters.planner.path_reuse_ticks,
            path_results_applied: counters.planner.results_applied,
            stale_path_results: counters.planner.stale_results_discarded,
            direct_line_fallbacks: counters.planner.direct_line_fallbacks,
            actions_completed: counters.actions.completed,
            actions_aborted: counters.actions.aborted,
            actions_unsupported: counters.actions.unsupported,
            script_failures: counters.actions.script_failures,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.tick_time_sum = Duration::ZERO;

        Some(snapshot)
    }
}
