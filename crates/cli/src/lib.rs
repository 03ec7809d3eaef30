//! Shared CLI wiring: tracing setup and runner construction.

use anyhow::Result;
use fpforge_core::RunnerConfig;
use fpforge_herbie::HerbieProcess;
use fpforge_platforms::{make_platform, Runner};

pub fn init_tracing() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

/// Build the concrete runner for a backend name. This is the only place
/// a platform string is dispatched on.
pub fn build_runner(platform: &str, config: RunnerConfig) -> Result<Runner> {
    let platform = make_platform(platform)?;
    let improver = HerbieProcess::from_env(config.working_dir.join("herbie"));
    Ok(Runner::new(platform, Box::new(improver), config))
}
