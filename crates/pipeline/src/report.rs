//! Serialized results: the JSON written here is the interface to the
//! external plotting and reporting tools.

use fpforge_core::{FPCore, ParetoFrontier, Provenance};
use fpforge_platforms::TimingResult;
use serde::{Deserialize, Serialize};

/// One kernel with everything the pipeline learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSummary {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub arity: usize,
    pub expr: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl CoreSummary {
    pub fn from_core(core: &FPCore) -> CoreSummary {
        CoreSummary {
            key: core.key.clone(),
            name: core.name.clone(),
            arity: core.arity(),
            expr: core.expr.to_string(),
            provenance: core.provenance.clone(),
            cost: core.cost,
            error: core.error,
            origin: core.origin.clone(),
        }
    }

    pub fn from_cores(cores: &[FPCore]) -> Vec<CoreSummary> {
        cores.iter().map(CoreSummary::from_core).collect()
    }
}

/// Timing table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingEntry {
    pub key: String,
    #[serde(flatten)]
    pub result: TimingResult,
}

impl TimingEntry {
    pub fn table(cores: &[FPCore], times: &[TimingResult]) -> Vec<TimingEntry> {
        cores
            .iter()
            .zip(times)
            .map(|(core, result)| TimingEntry {
                key: core.key.clone(),
                result: result.clone(),
            })
            .collect()
    }
}

/// One ablation configuration's results, or the diagnostic that kept it
/// from completing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AblationEntry {
    pub name: String,
    pub cores: Vec<CoreSummary>,
    pub times: Vec<TimingEntry>,
    pub frontier: ParetoFrontier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Combined output of the improvement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementReport {
    pub platform: String,
    pub seed: u64,
    pub num_points: usize,
    pub num_runs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub input: Vec<CoreSummary>,
    pub improved: Vec<CoreSummary>,
    pub times: Vec<TimingEntry>,
    pub frontier: ParetoFrontier,
    pub ablations: Vec<AblationEntry>,
}

/// Output of the cost tuning/evaluation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub platform: String,
    pub mode: String,
    pub num_points: usize,
    pub num_runs: usize,
    pub cores: Vec<CoreSummary>,
    pub times: Vec<TimingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontier: Option<ParetoFrontier>,
}
