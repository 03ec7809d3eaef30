//! Pipeline orchestration: the improvement and cost/tuning flows, the
//! ablation study loop, and report serialization.

pub mod ablation;
pub mod cost;
pub mod improve;
pub mod report;

pub use ablation::run_ablations;
pub use cost::{run_cost, CostOptions};
pub use improve::{run_improve, ImproveOptions};
pub use report::{CoreSummary, CostReport, ImprovementReport, TimingEntry};
