//! Generic-arithmetic backend: C with operators only, no libm.

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
    Op::Fabs,
    Op::Fmax,
    Op::Fmin,
];

pub struct ArithPlatform;

impl Platform for ArithPlatform {
    fn name(&self) -> &'static str {
        "arith"
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
            source: cgen::compile_scalar(core, false),
        })
    }

    fn make_driver(
        &self,
        core: &FPCore,
        compiled: &CompiledCore,
        sample: &Sample,
        _config: &RunnerConfig,
    ) -> String {
        cgen::scalar_driver(core, &compiled.source, sample, false)
    }

    fn compile_command(&self, dir: &Path) -> Option<Command> {
        let mut cmd = Command::new("cc");
        cmd.arg("-O2")
            .arg("-o")
            .arg(dir.join("driver"))
            .arg(dir.join("driver.c"));
        Some(cmd)
    }

    fn run_command(&self, dir: &Path) -> Command {
        Command::new(dir.join("driver"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpforge_core::parse::parse_cores;
    use std::path::Path;

    #[test]
    fn test_rejects_libm_operations() {
        let core = parse_cores("(FPCore (x) (sin x))", Path::new("<test>"))
            .unwrap()
            .remove(0);
        let err = ArithPlatform.compile_core(&core).unwrap_err();
        assert!(matches!(err, fpforge_core::Error::Unsupported { .. }));
    }

    #[test]
    fn test_accepts_plain_arithmetic_with_branches() {
        let core = parse_cores(
            "(FPCore (x y) (if (< x y) (/ x y) (fabs (- x y))))",
            Path::new("<test>"),
        )
        .unwrap()
        .remove(0);
        let compiled = ArithPlatform.compile_core(&core).unwrap();
        assert!(!compiled.source.contains("math.h"));
    }
}
