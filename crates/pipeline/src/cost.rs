//! The cost tuner/evaluator pipeline.
//!
//! Tuning mode times a synthesized per-operation kernel set; evaluation
//! mode runs the optimizer over a benchmark suite and reports the
//! measured trade-off. Configuration problems surface before any kernel
//! is read.

use crate::improve::time_batch;
use crate::report::{CoreSummary, CostReport, TimingEntry};
use anyhow::Result;
use fpforge_core::{check_samples, prune_unsamplable, Error};
use fpforge_platforms::Runner;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct CostOptions {
    pub herbie_input: Option<PathBuf>,
    pub herbie_threads: usize,
    pub tune: bool,
    pub compare: bool,
    pub restore: bool,
    pub py_sample: bool,
}

/// Reject invalid flag combinations before any file IO happens.
pub fn validate(opts: &CostOptions) -> fpforge_core::Result<()> {
    if opts.restore {
        return Err(Error::Config(
            "--restore (restore kernels from a working directory) is not implemented".into(),
        ));
    }
    if !opts.tune && opts.herbie_input.is_none() {
        return Err(Error::Config(
            "a benchmark input is required unless tuning or restoring; try --herbie-input".into(),
        ));
    }
    Ok(())
}

pub fn run_cost(runner: &Runner, opts: &CostOptions) -> Result<CostReport> {
    validate(opts)?;
    if opts.tune && opts.compare {
        warn!("comparison mode will be ignored when tuning");
    }

    // generate phase: synthesize locally, or read and improve
    let cores = if opts.tune {
        runner.synthesize()
    } else {
        let bench = opts.herbie_input.as_ref().expect("validated above");
        let input_cores = runner.read(bench)?;
        runner.improve(&input_cores, opts.herbie_threads, true, false)?
    };

    // core phase
    let samples = runner.sample(&cores, opts.py_sample)?;
    let (samples, cores) = prune_unsamplable(samples, cores);
    check_samples(&samples, &cores, runner.config().num_points)?;
    let mut cores = cores;
    let times = time_batch(runner, &cores, &samples)?;
    runner.cost(&mut cores, &times);

    // report phase
    let (mode, frontier) = if opts.tune {
        print_times(&cores, &times);
        ("tune", None)
    } else {
        runner.error(&mut cores, &samples)?;
        if opts.compare {
            // declared upstream but never specified; nothing to compare
            warn!("comparison against a baseline is not implemented; writing the plain report");
        }
        (
            "evaluate",
            Some(runner.pareto(&[], &cores)),
        )
    };

    let config = runner.config();
    let report = CostReport {
        platform: runner.platform_name().to_string(),
        mode: mode.to_string(),
        num_points: config.num_points,
        num_runs: config.num_runs,
        cores: CoreSummary::from_cores(&cores),
        times: TimingEntry::table(&cores, &times),
        frontier,
    };
    runner.write_report("cost.json", &report)?;
    runner.cleanup()?;
    info!(kernels = report.cores.len(), mode, "cost pipeline finished");
    Ok(report)
}

/// Tuning output: one line per kernel with its measured per-point cost.
fn print_times(cores: &[fpforge_core::FPCore], times: &[fpforge_platforms::TimingResult]) {
    println!("{:<28} {:>14}  {}", "kernel", "ns/point", "status");
    for (core, time) in cores.iter().zip(times) {
        match (core.cost, time) {
            (Some(cost), _) => println!("{:<28} {:>14.3}  ok", core.key, cost),
            (None, fpforge_platforms::TimingResult::Failed { stage, reason }) => {
                println!("{:<28} {:>14}  {:?}: {}", core.key, "-", stage, reason)
            }
            (None, _) => println!("{:<28} {:>14}  no timing", core.key, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_input_unless_tuning() {
        let opts = CostOptions::default();
        let err = validate(&opts).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let tuning = CostOptions {
            tune: true,
            ..CostOptions::default()
        };
        assert!(validate(&tuning).is_ok());

        let with_input = CostOptions {
            herbie_input: Some(PathBuf::from("bench.fpcore")),
            ..CostOptions::default()
        };
        assert!(validate(&with_input).is_ok());
    }

    #[test]
    fn test_validate_rejects_restore() {
        let opts = CostOptions {
            restore: true,
            tune: true,
            ..CostOptions::default()
        };
        let err = validate(&opts).unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }
}
