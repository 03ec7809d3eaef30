//! Explicit pipeline configuration, threaded through every stage.

use std::path::PathBuf;
use std::time::Duration;

/// Immutable configuration for one pipeline run. Thread counts, sample
/// size, and run count are always carried here rather than read from
/// ambient defaults.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which all working files are emitted.
    pub working_dir: PathBuf,
    /// Points per kernel sample.
    pub num_points: usize,
    /// Executions per driver when timing.
    pub num_runs: usize,
    /// Thread budget for driver compilation.
    pub threads: usize,
    /// Seed passed to the optimizer and the fallback sampler.
    pub seed: u64,
    /// Identifier under which reports are placed.
    pub key: Option<String>,
    /// Wall-clock bound on a single driver execution.
    pub driver_timeout: Duration,
    /// Keep per-kernel working directories after the run.
    pub keep_artifacts: bool,
}

impl RunnerConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        RunnerConfig {
            working_dir: working_dir.into(),
            num_points: 10_000,
            num_runs: 25,
            threads: 1,
            seed: 1,
            key: None,
            driver_timeout: Duration::from_secs(60),
            keep_artifacts: true,
        }
    }

    /// Directory for generated reports, namespaced by `key` when set.
    pub fn report_dir(&self) -> PathBuf {
        match &self.key {
            Some(key) => self.working_dir.join(key),
            None => self.working_dir.clone(),
        }
    }
}
