use std::process::ExitCode;

use tracing::{info, warn};
use waymark_engine::{run_simulation, LoopExit};

use super::bootstrap::AppWiring;
use super::demo;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        loop_config,
        mut simulation,
        metrics,
    } = app;

    let exit = run_simulation(&loop_config, &mut simulation, &metrics, demo::scenario_settled);
    match exit {
        LoopExit::Stopped => info!("scenario_settled"),
        LoopExit::TimeLimit => warn!("scenario_time_limit_reached"),
    }

    let counters = simulation.counters();
    if let Some(area) = simulation.shutdown() {
        for creature in area.creatures() {
            info!(
                creature = creature.id.0,
                tag = creature.tag.as_str(),
                x = creature.position.x,
                y = creature.position.y,
                remaining_actions = creature.actions.len(),
                "creature_final_state"
            );
        }
    }
    info!(
        path_results_applied = counters.planner.results_applied,
        path_jobs = counters.planner.jobs_dispatched,
        stale_paths = counters.planner.stale_results_discarded,
        actions_completed = counters.actions.completed,
        actions_aborted = counters.actions.aborted,
        "shutdown"
    );

    ExitCode::SUCCESS
}
