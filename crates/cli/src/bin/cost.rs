//! Cost tuner and evaluator entry point.

use anyhow::Result;
use clap::Parser;
use fpforge_core::RunnerConfig;
use fpforge_pipeline::{run_cost, CostOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fpforge-cost", about = "Cost tuner and evaluator")]
struct Cli {
    /// Number of threads for compilation.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Number of threads for the optimizer.
    #[arg(long, default_value_t = 1)]
    herbie_threads: usize,

    /// Directory or FPCore file for the optimizer to run on. Required
    /// when not in tune or restore mode.
    #[arg(long)]
    herbie_input: Option<PathBuf>,

    /// Number of input points to evaluate on.
    #[arg(long, default_value_t = 10_000)]
    num_points: usize,

    /// Number of times to run drivers to obtain an average.
    #[arg(long, default_value_t = 25)]
    num_runs: usize,

    /// Cost tuning mode.
    #[arg(long, default_value_t = false)]
    tune: bool,

    /// Comparison against a baseline.
    #[arg(long, default_value_t = false)]
    compare: bool,

    /// Restore kernels from the working directory.
    #[arg(long, default_value_t = false)]
    restore: bool,

    /// Use the local sampling method. Useful for debugging.
    #[arg(long, default_value_t = false)]
    py_sample: bool,

    /// Backend to generate and time drivers for.
    #[arg(value_parser = ["arith", "c", "mkl", "python"])]
    lang: String,

    /// Directory to emit all working files into.
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    fpforge_cli::init_tracing();
    let cli = Cli::parse();

    let mut config = RunnerConfig::new(cli.output_dir);
    config.num_points = cli.num_points;
    config.num_runs = cli.num_runs;
    config.threads = cli.threads;

    let runner = fpforge_cli::build_runner(&cli.lang, config)?;
    let opts = CostOptions {
        herbie_input: cli.herbie_input,
        herbie_threads: cli.herbie_threads,
        tune: cli.tune,
        compare: cli.compare,
        restore: cli.restore,
        py_sample: cli.py_sample,
    };
    run_cost(&runner, &opts)?;
    Ok(())
}
