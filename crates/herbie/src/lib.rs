//! Bridge to the external accuracy optimizer, plus input sampling.

pub mod adapter;
pub mod sampler;

pub use adapter::{AblationConfig, HerbieProcess, ImproveConfig, Improver, LocalImprover};
pub use sampler::local_sample;
