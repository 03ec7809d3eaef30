//! Driver compilation and timed execution.
//!
//! Compilation fans out across kernels on a bounded thread pool; every
//! failure is recorded per driver and never aborts the batch. Execution
//! is sequential so drivers cannot perturb each other's timings, with a
//! wall-clock bound per run so one hung benchmark cannot stall the whole
//! batch.

use crate::{DriverDir, Platform};
use fpforge_core::RunnerConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of compiling one driver directory.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    Ok,
    Failed(String),
}

impl CompileOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CompileOutcome::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailStage {
    Compile,
    Run,
    Timeout,
}

/// Aggregate timing for one driver, or the reason none could be taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TimingResult {
    Timed { nanos: f64, runs: usize },
    Failed { stage: FailStage, reason: String },
}

impl TimingResult {
    pub fn nanos(&self) -> Option<f64> {
        match self {
            TimingResult::Timed { nanos, .. } => Some(*nanos),
            TimingResult::Failed { .. } => None,
        }
    }
}

/// Compile every driver directory, `config.threads` at a time. Failures
/// are isolated per directory; the stderr of a failing toolchain run is
/// kept alongside the directory in `compile.log`.
pub fn compile_drivers(
    platform: &dyn Platform,
    dirs: &[DriverDir],
    config: &RunnerConfig,
) -> Vec<CompileOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()
        .expect("building the compile pool cannot fail");
    pool.install(|| {
        dirs.par_iter()
            .map(|dir| {
                let mut cmd = match platform.compile_command(&dir.path) {
                    Some(cmd) => cmd,
                    None => return CompileOutcome::Ok,
                };
                debug!(key = %dir.key, "compiling driver");
                match cmd.output() {
                    Ok(output) if output.status.success() => CompileOutcome::Ok,
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                        let _ = std::fs::write(dir.path.join("compile.log"), &stderr);
                        warn!(key = %dir.key, "driver compilation failed");
                        CompileOutcome::Failed(stderr)
                    }
                    Err(e) => {
                        warn!(key = %dir.key, error = %e, "toolchain could not be spawned");
                        CompileOutcome::Failed(e.to_string())
                    }
                }
            })
            .collect()
    })
}

/// Execute each compiled driver `config.num_runs` times and aggregate
/// with a trimmed mean. A crashing, hanging, or unparseable driver
/// yields a failure sentinel for that kernel only.
pub fn run_drivers(
    platform: &dyn Platform,
    dirs: &[DriverDir],
    compiled: &[CompileOutcome],
    config: &RunnerConfig,
) -> Vec<TimingResult> {
    dirs.iter()
        .zip(compiled)
        .map(|(dir, outcome)| match outcome {
            CompileOutcome::Failed(reason) => TimingResult::Failed {
                stage: FailStage::Compile,
                reason: reason.clone(),
            },
            CompileOutcome::Ok => time_driver(platform, dir, config),
        })
        .collect()
}

fn time_driver(platform: &dyn Platform, dir: &DriverDir, config: &RunnerConfig) -> TimingResult {
    let mut nanos = Vec::with_capacity(config.num_runs);
    let mut timeouts = 0usize;
    let mut last_failure = String::new();

    for run in 0..config.num_runs.max(1) {
        let mut cmd = platform.run_command(&dir.path);
        match run_with_timeout(&mut cmd, config.driver_timeout) {
            Ok(RunOutcome::Completed {
                success: true,
                stdout,
                ..
            }) => match parse_nanos(&stdout) {
                Some(ns) => nanos.push(ns),
                None => {
                    last_failure = format!("run {}: no timing on stdout", run);
                }
            },
            Ok(RunOutcome::Completed { stderr, .. }) => {
                last_failure = format!("run {}: {}", run, stderr.trim());
            }
            Ok(RunOutcome::TimedOut) => {
                timeouts += 1;
                warn!(key = %dir.key, run, "driver run timed out");
            }
            Err(e) => {
                last_failure = format!("run {}: {}", run, e);
            }
        }
    }

    let log: String = nanos.iter().map(|ns| format!("{}\n", ns)).collect();
    let _ = std::fs::write(dir.path.join("times.log"), log);

    if nanos.is_empty() {
        if timeouts > 0 {
            TimingResult::Failed {
                stage: FailStage::Timeout,
                reason: format!("{} of {} runs timed out", timeouts, config.num_runs),
            }
        } else {
            TimingResult::Failed {
                stage: FailStage::Run,
                reason: if last_failure.is_empty() {
                    "no successful runs".into()
                } else {
                    last_failure
                },
            }
        }
    } else {
        let runs = nanos.len();
        TimingResult::Timed {
            nanos: trimmed_mean(&mut nanos),
            runs,
        }
    }
}

enum RunOutcome {
    Completed {
        success: bool,
        stdout: String,
        stderr: String,
    },
    TimedOut,
}

fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::io::Result<RunOutcome> {
    let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stdout.take() {
                let _ = pipe.read_to_string(&mut stdout);
            }
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Ok(RunOutcome::Completed {
                success: status.success(),
                stdout,
                stderr,
            });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutcome::TimedOut);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// The driver's protocol: the last stdout line is the elapsed time in
/// nanoseconds.
fn parse_nanos(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|ns| ns.is_finite() && *ns >= 0.0)
}

/// Mean after dropping the lowest and highest tenth of the values.
fn trimmed_mean(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let trim = values.len() / 10;
    let kept = &values[trim..values.len() - trim];
    kept.iter().sum::<f64>() / kept.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nanos_takes_last_line() {
        assert_eq!(parse_nanos("warmup\n12345\n"), Some(12345.0));
        assert_eq!(parse_nanos(""), None);
        assert_eq!(parse_nanos("not a number"), None);
        assert_eq!(parse_nanos("-5"), None);
    }

    #[test]
    fn test_trimmed_mean_drops_outliers() {
        let mut values = vec![10.0, 11.0, 9.0, 10.0, 11.0, 9.0, 10.0, 10.0, 1000.0, 1.0];
        let mean = trimmed_mean(&mut values);
        assert!((mean - 10.0).abs() < 0.5, "got {}", mean);
    }

    #[test]
    fn test_trimmed_mean_small_inputs() {
        assert_eq!(trimmed_mean(&mut [42.0]), 42.0);
        assert_eq!(trimmed_mean(&mut [1.0, 3.0]), 2.0);
    }
}
