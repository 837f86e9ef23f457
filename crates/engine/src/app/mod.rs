mod loop_runner;
mod metrics;

pub use loop_runner::{run_simulation, LoopConfig, LoopExit};
pub use metrics::{SimMetricsHandle, SimMetricsSnapshot};
