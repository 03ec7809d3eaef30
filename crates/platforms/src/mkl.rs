//! Vector-library backend: C against the MKL vector-math API.
//!
//! The expression tree is lowered operator by operator onto whole-sample
//! arrays, so one kernel invocation processes every input point. Scalar
//! control flow (`if`, comparisons) has no vector form here and is
//! rejected at translation time.

use crate::{cgen, check_ops, CompiledCore, Platform};
use fpforge_core::{Expr, FPCore, Op, Result, RunnerConfig, Sample};
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
    Op::Fmax,
    Op::Fmin,
    Op::Floor,
    Op::Ceil,
    Op::Round,
];

fn vml_name(op: Op) -> Option<&'static str> {
    let name = match op {
        Op::Add => "vdAdd",
        Op::Sub => "vdSub",
        Op::Mul => "vdMul",
        Op::Div => "vdDiv",
        Op::Pow => "vdPow",
        Op::Sqrt => "vdSqrt",
        Op::Cbrt => "vdCbrt",
        Op::Fabs => "vdAbs",
        Op::Exp => "vdExp",
        Op::Log => "vdLn",
        Op::Sin => "vdSin",
        Op::Cos => "vdCos",
        Op::Tan => "vdTan",
        Op::Atan => "vdAtan",
        Op::Fmax => "vdFmax",
        Op::Fmin => "vdFmin",
        Op::Floor => "vdFloor",
        Op::Ceil => "vdCeil",
        Op::Round => "vdRound",
        _ => return None,
    };
    Some(name)
}

struct VecEmitter {
    lines: Vec<String>,
    buffers: usize,
    env: Vec<(String, String)>,
}

impl VecEmitter {
    fn fresh(&mut self) -> String {
        self.buffers += 1;
        format!("_b{}", self.buffers - 1)
    }

    fn expr(&mut self, e: &Expr) -> String {
        match e {
            Expr::Num(v) => {
                let buf = self.fresh();
                self.lines.push(format!(
                    "    for (MKL_INT i = 0; i < n; i++) {}[i] = {};",
                    buf,
                    cgen::format_f64(*v)
                ));
                buf
            }
            Expr::Var(name) => self
                .env
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, a)| a.clone())
                .unwrap_or_else(|| name.clone()),
            Expr::Op(Op::Neg, args) => {
                let a = self.expr(&args[0]);
                let buf = self.fresh();
                self.lines.push(format!(
                    "    for (MKL_INT i = 0; i < n; i++) {}[i] = -{}[i];",
                    buf, a
                ));
                buf
            }
            Expr::Op(op, args) => {
                let a: Vec<String> = args.iter().map(|arg| self.expr(arg)).collect();
                let buf = self.fresh();
                let vml = vml_name(*op).expect("platform validated the operator set");
                self.lines
                    .push(format!("    {}(n, {}, {});", vml, a.join(", "), buf));
                buf
            }
            Expr::Let {
                sequential,
                bindings,
                body,
            } => {
                let depth = self.env.len();
                if *sequential {
                    for (name, bound) in bindings {
                        let array = self.expr(bound);
                        self.env.push((name.clone(), array));
                    }
                } else {
                    let arrays: Vec<String> =
                        bindings.iter().map(|(_, bound)| self.expr(bound)).collect();
                    for ((name, _), array) in bindings.iter().zip(arrays) {
                        self.env.push((name.clone(), array));
                    }
                }
                let result = self.expr(body);
                self.env.truncate(depth);
                result
            }
            Expr::If(..) => unreachable!("platform rejected branches"),
        }
    }
}

pub struct MklPlatform;

impl Platform for MklPlatform {
    fn name(&self) -> &'static str {
        "mkl"
    }

    fn driver_file(&self) -> &'static str {
        "driver.c"
    }

    fn supported_ops(&self) -> &'static [Op] {
        OPS
    }

    fn supports_branches(&self) -> bool {
        false
    }

    fn compile_core(&self, core: &FPCore) -> Result<CompiledCore> {
        check_ops(self, core)?;
        let names = cgen::arg_names(core);
        let mut emitter = VecEmitter {
            lines: Vec::new(),
            buffers: 0,
            env: core
                .args
                .iter()
                .cloned()
                .zip(names.iter().cloned())
                .collect(),
        };
        let result = emitter.expr(&core.expr);

        let mut source = String::new();
        for b in 0..emitter.buffers {
            source.push_str(&format!("static double _b{}[N_POINTS];\n", b));
        }
        let params: Vec<String> = names.iter().map(|n| format!("const double *{}", n)).collect();
        let params = if params.is_empty() {
            String::new()
        } else {
            format!("{}, ", params.join(", "))
        };
        source.push_str(&format!(
            "\nstatic void fpforge_kernel(const MKL_INT n, {}double *out) {{\n",
            params
        ));
        for line in &emitter.lines {
            source.push_str(line);
            source.push('\n');
        }
        source.push_str(&format!(
            "    for (MKL_INT i = 0; i < n; i++) out[i] = {}[i];\n}}\n",
            result
        ));
        Ok(CompiledCore {
            key: core.key.clone(),
            source,
        })
    }

    fn make_driver(
        &self,
        core: &FPCore,
        compiled: &CompiledCore,
        sample: &Sample,
        _config: &RunnerConfig,
    ) -> String {
        let n = sample.points.len();
        let names = cgen::arg_names(core);
        let mut columns = String::new();
        for (i, name) in names.iter().enumerate() {
            let vals: Vec<String> = sample
                .points
                .iter()
                .map(|p| cgen::format_f64(p[i]))
                .collect();
            columns.push_str(&format!(
                "static const double {}[N_POINTS] = {{\n    {}\n}};\n\n",
                name,
                vals.join(",\n    ")
            ));
        }
        let call_args: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let call_args = if call_args.is_empty() {
            String::new()
        } else {
            format!("{}, ", call_args.join(", "))
        };

        format!(
            r#"#include <stdio.h>
#include <time.h>
#include <mkl.h>

#define N_POINTS {n}

{columns}static const double truths[N_POINTS] = {{
{truths}
}};

static double outs[N_POINTS];

{kernel}
int main(void) {{
    struct timespec start, end;
    clock_gettime(CLOCK_MONOTONIC, &start);
    fpforge_kernel(N_POINTS, {call_args}outs);
    clock_gettime(CLOCK_MONOTONIC, &end);
    long long nanos = (long long)(end.tv_sec - start.tv_sec) * 1000000000LL
        + (end.tv_nsec - start.tv_nsec);

    int bad = 0;
    for (int i = 0; i < N_POINTS; i++) {{
        double want = truths[i];
        double got = outs[i];
        double diff = got - want;
        if (diff < 0.0) diff = -diff;
        double mag = want < 0.0 ? -want : want;
        if (want != want) {{
            if (got == got) bad++;
        }} else if (got != got || diff > 1e-9 * mag + 1e-12) {{
            bad++;
        }}
    }}
    if (bad > N_POINTS / 100) {{
        fprintf(stderr, "%d of %d outputs disagree with the reference\n", bad, N_POINTS);
        return 1;
    }}
    printf("%lld\n", nanos);
    return 0;
}}
"#,
            n = n,
            columns = columns,
            truths = cgen::truths_table(sample),
            kernel = compiled.source,
            call_args = call_args,
        )
    }

    fn compile_command(&self, dir: &Path) -> Option<Command> {
        let mut cmd = Command::new("cc");
        cmd.arg("-O2")
            .arg("-o")
            .arg(dir.join("driver"))
            .arg(dir.join("driver.c"))
            .arg("-lmkl_rt")
            .arg("-lm");
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

    fn core(text: &str) -> FPCore {
        parse_cores(text, Path::new("<test>")).unwrap().remove(0)
    }

    #[test]
    fn test_lowering_uses_vector_calls() {
        let compiled = MklPlatform
            .compile_core(&core("(FPCore (x y) (exp (* x y)))"))
            .unwrap();
        assert!(compiled.source.contains("vdMul(n, x, y, _b0);"));
        assert!(compiled.source.contains("vdExp(n, _b0, _b1);"));
    }

    #[test]
    fn test_branches_are_rejected() {
        let err = MklPlatform
            .compile_core(&core("(FPCore (x) (if (< x 0) 0 x))"))
            .unwrap_err();
        assert!(matches!(err, fpforge_core::Error::Unsupported { .. }));
    }

    #[test]
    fn test_constants_are_broadcast() {
        let compiled = MklPlatform
            .compile_core(&core("(FPCore (x) (+ x 1))"))
            .unwrap();
        assert!(compiled.source.contains("_b0[i] = 1.00000000000000000e0;"));
    }
}
