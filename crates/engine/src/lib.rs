use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;

pub mod actions;
pub mod app;
pub mod clock;
pub mod config;
pub mod jobs;
pub mod nav;
pub mod script;
pub mod world;

pub use actions::{
    Action, ActionKind, ActionOutcome, ActionProcessor, ActionStack, ActionStats,
    DialogStartHandler,
};
pub use app::{run_simulation, LoopConfig, LoopExit, SimMetricsHandle, SimMetricsSnapshot};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{load_config_file, ConfigError, EngineConfig};
pub use jobs::{JobExecutor, JobExecutorError, JobLiveness, ManualExecutor, ThreadPoolExecutor};
pub use nav::{
    DirectNavigation, MotionResolver, NavigationQuery, Path as NavPath, PathPlanner, PathState,
    PlannerConfig, PlannerStats, Unobstructed,
};
pub use script::{
    ExecutionContext, NullScriptRunner, ScriptError, ScriptInvocation, ScriptProgram,
    ScriptRunner,
};
pub use world::{Area, Creature, EntityId, MovementType, SimCounters, Simulation, Vec3, Waypoint};

pub const CONFIG_ENV_VAR: &str = "WAYMARK_CONFIG";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start job executor: {0}")]
    Executor(#[from] JobExecutorError),
}

/// Defaults, then the JSON file named by `WAYMARK_CONFIG`, then the
/// individual env overrides. The result is validated before it is returned.
pub fn resolve_engine_config() -> Result<EngineConfig, StartupError> {
    let mut config = match env::var(CONFIG_ENV_VAR) {
        Ok(value) => {
            let path = Path::new(&value);
            let config = load_config_file(path)?;
            info!(path = %path.display(), "config_file_loaded");
            config
        }
        Err(env::VarError::NotPresent) => EngineConfig::default(),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: CONFIG_ENV_VAR,
                source,
            })
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
