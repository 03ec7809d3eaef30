//! Backend platforms and the platform-polymorphic pipeline runner.
//!
//! A `Platform` carries only what differs between backends: how an
//! expression becomes backend source, how a driver is laid out, and which
//! toolchain commands build and run it. Everything else (sampling,
//! improvement, timing, cost/error, frontiers) lives in `Runner`, written
//! once. Backend selection happens exactly once, in `make_platform`.

pub mod arith;
pub mod c;
pub mod cgen;
pub mod driver;
pub mod harness;
pub mod mkl;
pub mod python;
pub mod runner;

use fpforge_core::{Error, FPCore, Op, Result, RunnerConfig, Sample};
use std::path::Path;
use std::process::Command;

pub use driver::DriverDir;
pub use harness::{CompileOutcome, FailStage, TimingResult};
pub use runner::Runner;

/// A kernel translated into backend-idiomatic source.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCore {
    pub key: String,
    pub source: String,
}

/// Backend-specific code generation and toolchain hooks. One
/// implementation per backend variant; the shared pipeline never
/// branches on a platform name.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// File name of the generated driver inside its working directory.
    fn driver_file(&self) -> &'static str;

    /// Arithmetic operations this backend can express.
    fn supported_ops(&self) -> &'static [Op];

    /// Whether `if` and comparison operators can be lowered.
    fn supports_branches(&self) -> bool;

    /// Pure translation of a kernel into backend source. Deterministic:
    /// the same kernel always yields the same text.
    fn compile_core(&self, core: &FPCore) -> Result<CompiledCore>;

    /// A self-contained benchmark program embedding the sample's input
    /// points and reference outputs.
    fn make_driver(
        &self,
        core: &FPCore,
        compiled: &CompiledCore,
        sample: &Sample,
        config: &RunnerConfig,
    ) -> String;

    /// Toolchain invocation for one driver directory; `None` for
    /// interpreted backends.
    fn compile_command(&self, dir: &Path) -> Option<Command>;

    /// Invocation that executes the (compiled) driver once.
    fn run_command(&self, dir: &Path) -> Command;
}

/// Construct the platform for a backend name. This is the single point
/// of dispatch over the closed variant set.
pub fn make_platform(name: &str) -> Result<Box<dyn Platform>> {
    match name {
        "arith" => Ok(Box::new(arith::ArithPlatform)),
        "c" => Ok(Box::new(c::CPlatform)),
        "mkl" => Ok(Box::new(mkl::MklPlatform)),
        "python" => Ok(Box::new(python::PythonPlatform)),
        other => Err(Error::Config(format!(
            "unsupported platform `{}` (expected arith, c, mkl, or python)",
            other
        ))),
    }
}

/// Reject kernels using operations the backend cannot express.
pub(crate) fn check_ops(platform: &dyn Platform, core: &FPCore) -> Result<()> {
    if core.expr.has_branches() && !platform.supports_branches() {
        return Err(Error::Unsupported {
            platform: platform.name().to_string(),
            op: "if".to_string(),
        });
    }
    for op in core.expr.operators() {
        if op.is_predicate() {
            if !platform.supports_branches() {
                return Err(Error::Unsupported {
                    platform: platform.name().to_string(),
                    op: op.name().to_string(),
                });
            }
        } else if !platform.supported_ops().contains(&op) {
            return Err(Error::Unsupported {
                platform: platform.name().to_string(),
                op: op.name().to_string(),
            });
        }
    }
    Ok(())
}
