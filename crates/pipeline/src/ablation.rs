//! Ablation orchestration: re-run the improvement pipeline under each
//! named optimizer configuration and collect comparative results.
//!
//! Configurations run sequentially. A configuration that fails is
//! recorded with its diagnostic and the remaining configurations still
//! run (collect-and-continue).

use crate::improve::{run_config, ImproveOptions};
use crate::report::AblationEntry;
use fpforge_core::FPCore;
use fpforge_herbie::AblationConfig;
use fpforge_platforms::Runner;
use tracing::{error, info};

pub fn run_ablations(
    runner: &Runner,
    annotated_inputs: &[FPCore],
    configs: &[AblationConfig],
    opts: &ImproveOptions,
) -> Vec<AblationEntry> {
    configs
        .iter()
        .map(|config| match run_config(runner, annotated_inputs, config, opts) {
            Ok(run) => {
                info!(
                    config = %config.name,
                    kernels = run.cores.len(),
                    frontier = run.frontier.len(),
                    "ablation configuration complete"
                );
                AblationEntry {
                    name: config.name.clone(),
                    cores: crate::report::CoreSummary::from_cores(&run.cores),
                    times: run.times,
                    frontier: run.frontier,
                    failure: None,
                }
            }
            Err(e) => {
                error!(config = %config.name, error = %e, "ablation configuration failed; continuing");
                AblationEntry {
                    name: config.name.clone(),
                    cores: Vec::new(),
                    times: Vec::new(),
                    frontier: Vec::new(),
                    failure: Some(e.to_string()),
                }
            }
        })
        .collect()
}
