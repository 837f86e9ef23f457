use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use waymark_engine::{resolve_engine_config, LoopConfig, SimMetricsHandle, Simulation};

use super::demo;

const DEMO_RUN_LIMIT: Duration = Duration::from_secs(60);

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) simulation: Simulation,
    pub(crate) metrics: SimMetricsHandle,
}

pub(crate) fn build_app() -> Result<AppWiring, ExitCode> {
    init_tracing();
    info!("=== Waymark Startup ===");

    let config = resolve_engine_config().map_err(|err| {
        error!(error = %err, "startup_failed");
        ExitCode::FAILURE
    })?;
    info!(
        worker_threads = config.worker_threads,
        keep_path_ms = config.planner.keep_path_ms,
        target_tps = config.target_tps,
        "engine_config"
    );

    let mut loop_config = config.loop_config();
    loop_config.max_run_duration.get_or_insert(DEMO_RUN_LIMIT);

    let mut simulation = Simulation::with_thread_pool(config).map_err(|err| {
        error!(error = %err, "startup_failed");
        ExitCode::FAILURE
    })?;
    let area = demo::load_scenario()
        .and_then(|scenario| demo::build_demo_area(&simulation, &scenario))
        .map_err(|err| {
            error!(error = %err, "scenario_failed");
            ExitCode::FAILURE
        })?;
    simulation.transition_to(area);

    Ok(AppWiring {
        loop_config,
        simulation,
        metrics: SimMetricsHandle::default(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
