use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::app::LoopConfig;
use crate::nav::PlannerConfig;

pub const WORKER_THREADS_ENV_VAR: &str = "WAYMARK_WORKER_THREADS";
pub const TARGET_TPS_ENV_VAR: &str = "WAYMARK_TARGET_TPS";
pub const KEEP_PATH_MS_ENV_VAR: &str = "WAYMARK_KEEP_PATH_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub planner: PlannerConfig,
    pub worker_threads: usize,
    pub default_run_speed: f32,
    pub target_tps: u32,
    pub max_ticks_per_frame: u32,
    pub max_frame_delta_ms: u64,
    pub metrics_log_interval_ms: u64,
    pub max_run_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            worker_threads: 2,
            default_run_speed: 5.4,
            target_tps: 60,
            max_ticks_per_frame: 5,
            max_frame_delta_ms: 250,
            metrics_log_interval_ms: 1_000,
            max_run_ms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path} at '{field}': {message}")]
    Parse {
        path: PathBuf,
        field: String,
        message: String,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl EngineConfig {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            target_tps: self.target_tps,
            max_ticks_per_frame: self.max_ticks_per_frame,
            max_frame_delta: Duration::from_millis(self.max_frame_delta_ms),
            metrics_log_interval: Duration::from_millis(self.metrics_log_interval_ms),
            max_run_duration: self.max_run_ms.map(Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.target_tps == 0 {
            return Err(ConfigError::Invalid {
                field: "target_tps",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.default_run_speed.is_finite() || self.default_run_speed <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "default_run_speed",
                reason: format!("must be positive, got {}", self.default_run_speed),
            });
        }
        let reach = self.planner.waypoint_reach_distance_sq;
        if !reach.is_finite() || reach < 0.0 {
            return Err(ConfigError::Invalid {
                field: "planner.waypoint_reach_distance_sq",
                reason: format!("must be a non-negative number, got {reach}"),
            });
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|var| env::var(var));
    }

    fn apply_overrides_with(
        &mut self,
        mut lookup: impl FnMut(&'static str) -> Result<String, env::VarError>,
    ) {
        if let Some(value) = read_override(&mut lookup, WORKER_THREADS_ENV_VAR) {
            self.worker_threads = value;
        }
        if let Some(value) = read_override(&mut lookup, TARGET_TPS_ENV_VAR) {
            self.target_tps = value;
        }
        if let Some(value) = read_override(&mut lookup, KEEP_PATH_MS_ENV_VAR) {
            self.planner.keep_path_ms = value;
        }
    }
}

fn read_override<T: FromStr>(
    lookup: &mut impl FnMut(&'static str) -> Result<String, env::VarError>,
    var: &'static str,
) -> Option<T> {
    match lookup(var) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(
                    env_var = var,
                    value = value.as_str(),
                    "invalid env var value; falling back to config"
                );
                None
            }
        },
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                env_var = var,
                error = %err,
                "unable to read env var; falling back to config"
            );
            None
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let deserializer = &mut serde_json::Deserializer::from_str(&text);
    serde_path_to_error::deserialize(deserializer).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        field: error.path().to_string(),
        message: error.inner().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    fn lookup_from(
        values: &[(&'static str, &'static str)],
    ) -> impl FnMut(&'static str) -> Result<String, env::VarError> {
        let map = values.iter().copied().collect::<HashMap<_, _>>();
        move |var| {
            map.get(var)
                .map(|value| value.to_string())
                .ok_or(env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_are_valid_and_keep_one_second_grace_window() {
        let config = EngineConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.planner.keep_path_ms, 1_000);
        assert_eq!(config.planner.waypoint_reach_distance_sq, 1.0);
    }

    #[test]
    fn env_overrides_replace_values() {
        let mut config = EngineConfig::default();
        config.apply_overrides_with(lookup_from(&[
            (WORKER_THREADS_ENV_VAR, "6"),
            (TARGET_TPS_ENV_VAR, " 30 "),
            (KEEP_PATH_MS_ENV_VAR, "250"),
        ]));

        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.target_tps, 30);
        assert_eq!(config.planner.keep_path_ms, 250);
    }

    #[test]
    fn invalid_env_override_falls_back_to_config() {
        let mut config = EngineConfig::default();
        config.apply_overrides_with(lookup_from(&[(WORKER_THREADS_ENV_VAR, "many")]));
        assert_eq!(config.worker_threads, EngineConfig::default().worker_threads);
    }

    #[test]
    fn partial_config_file_keeps_defaults_for_missing_fields() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("waymark.json");
        fs::write(&path, r#"{ "worker_threads": 4, "planner": { "keep_path_ms": 500 } }"#)
            .expect("write config");

        let config = load_config_file(&path).expect("config loads");

        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.planner.keep_path_ms, 500);
        assert_eq!(config.planner.waypoint_reach_distance_sq, 1.0);
        assert_eq!(config.target_tps, 60);
    }

    #[test]
    fn parse_error_reports_failing_field_path() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("waymark.json");
        fs::write(&path, r#"{ "planner": { "keep_path_ms": "soon" } }"#).expect("write config");

        let error = load_config_file(&path).expect_err("bad type");

        match error {
            ConfigError::Parse { field, .. } => assert_eq!(field, "planner.keep_path_ms"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_read_error() {
        let temp = TempDir::new().expect("temp dir");
        let error = load_config_file(&temp.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn validate_rejects_zero_workers_and_negative_reach() {
        let config = EngineConfig {
            worker_threads: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "worker_threads",
                ..
            })
        ));

        let mut config = EngineConfig::default();
        config.planner.waypoint_reach_distance_sq = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "planner.waypoint_reach_distance_sq",
                ..
            })
        ));
    }

    #[test]
    fn loop_config_converts_millisecond_fields() {
        let config = EngineConfig {
            max_run_ms: Some(1_500),
            ..EngineConfig::default()
        };
        let loop_config = config.loop_config();
        assert_eq!(loop_config.max_frame_delta, Duration::from_millis(250));
        assert_eq!(loop_config.max_run_duration, Some(Duration::from_millis(1_500)));
    }
}
