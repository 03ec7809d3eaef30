//! Native backend: C with libm, compiled with the system toolchain.

use crate::{cgen, check_ops, CompiledCore, Platform};
use fpforge_core::{FPCore, Op, Result, RunnerConfig, Sample};
use std::path::Path;
use std::process::Command;

const OPS: &[Op] = &[
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Div,
    Op::Neg,
    Op::Pow,
    Op::Sqrt,
    Op::Cbrt,
    Op::Fabs,
    Op::Exp,
    Op::Log,
    Op::Sin,
    Op::Cos,
    Op::Tan,
    Op::Atan,
    Op::Fma,
    Op::Fmax,
    Op::Fmin,
    Op::Floor,
    Op::Ceil,
    Op::Round,
];

pub struct CPlatform;

impl Platform for CPlatform {
    fn name(&self) -> &'static str {
        "c"
    }

    fn driver_file(&self) -> &'static str {
        "driver.c"
    }

    fn supported_ops(&self) -> &'static [Op] {
        OPS
    }

    fn supports_branches(&self) -> bool {
        true
    }

    fn compile_core(&self, core: &FPCore) -> Result<CompiledCore> {
        check_ops(self, core)?;
        Ok(CompiledCore {
            key: core.key.clone(),
            source: cgen::compile_scalar(core, true),
        })
    }

    fn make_driver(
        &self,
        core: &FPCore,
        compiled: &CompiledCore,
        sample: &Sample,
        _config: &RunnerConfig,
    ) -> String {
        cgen::scalar_driver(core, &compiled.source, sample, true)
    }

    fn compile_command(&self, dir: &Path) -> Option<Command> {
        let mut cmd = Command::new("cc");
        cmd.arg("-O2")
            .arg("-o")
            .arg(dir.join("driver"))
            .arg(dir.join("driver.c"))
            .arg("-lm");
        Some(cmd)
    }

    fn run_command(&self, dir: &Path) -> Command {
        Command::new(dir.join("driver"))
    }
}
