//! Error taxonomy shared across the pipeline.
//!
//! Fatal classes abort the run; per-driver compile/run failures are not
//! errors at all but values (`TimingResult::Failed`) so that batches can
//! aggregate partial results without exception-driven control flow.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed kernel input.
    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Invalid CLI or pipeline configuration, caught before any work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The external optimizer failed or produced unparseable output.
    #[error("optimizer failed: {0}")]
    Optimizer(String),

    /// A sample disagrees with its kernel after sampling. Signals an
    /// upstream bug; never expected in correct operation.
    #[error("sample invariant violated for `{key}`: {reason}")]
    SampleInvariant { key: String, reason: String },

    /// The selected backend cannot express an operation in the kernel set.
    #[error("platform `{platform}` does not support `{op}`")]
    Unsupported { platform: String, op: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
