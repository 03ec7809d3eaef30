//! Platform improvement runner entry point.

use anyhow::Result;
use clap::Parser;
use fpforge_core::RunnerConfig;
use fpforge_pipeline::{run_improve, ImproveOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fpforge-improve", about = "Platform-specific improvement runner")]
struct Cli {
    /// Number of threads for compilation.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Number of threads for the optimizer.
    #[arg(long, default_value_t = 1)]
    herbie_threads: usize,

    /// Number of input points to evaluate on.
    #[arg(long, default_value_t = 10_000)]
    num_points: usize,

    /// Number of times to run drivers to obtain an average.
    #[arg(long, default_value_t = 10)]
    num_runs: usize,

    /// Use the local sampling method. Useful for debugging.
    #[arg(long, default_value_t = false)]
    py_sample: bool,

    /// Unique identifier under which to place reports and other output.
    #[arg(long)]
    key: Option<String>,

    /// Re-run the pipeline under every ablation configuration.
    #[arg(long, default_value_t = false)]
    ablation: bool,

    /// Random seed for the optimizer and the fallback sampler.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Backend to generate and time drivers for.
    #[arg(value_parser = ["arith", "c", "mkl", "python"])]
    platform: String,

    /// Directory or FPCore file for the optimizer to run on.
    bench_path: PathBuf,

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
    config.seed = cli.seed;
    config.key = cli.key;

    let runner = fpforge_cli::build_runner(&cli.platform, config)?;
    let opts = ImproveOptions {
        bench_path: cli.bench_path,
        herbie_threads: cli.herbie_threads,
        py_sample: cli.py_sample,
        ablation: cli.ablation,
    };
    run_improve(&runner, &opts)?;
    Ok(())
}
