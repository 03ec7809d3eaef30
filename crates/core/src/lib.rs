//! Core data model for fpforge: FPCore kernels, expression evaluation,
//! input samples, Pareto frontiers, and the shared error taxonomy.

pub mod config;
pub mod error;
pub mod expr;
pub mod fpcore;
pub mod parse;
pub mod pareto;
pub mod sample;

pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use expr::{Expr, Op};
pub use fpcore::{FPCore, Provenance};
pub use pareto::{pareto_frontier, ParetoFrontier, ParetoPoint};
pub use sample::{check_samples, prune_unsamplable, Sample};
