//! Interpreted backend: self-contained Python drivers, no compile step.
//!
//! Python arithmetic raises where C quietly produces inf/nan, so the
//! driver maps raising operations onto NaN and a few helpers reproduce
//! the C library semantics (`fmax`/`fmin` ignoring NaN, `round` halving
//! away from zero).

use crate::{check_ops, CompiledCore, Platform};
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
    Op::Fma,
    Op::Fmax,
    Op::Fmin,
    Op::Floor,
    Op::Ceil,
    Op::Round,
];

const HELPERS: &str = r#"def _cbrt(x):
    return math.copysign(abs(x) ** (1.0 / 3.0), x)

def _fma(a, b, c):
    return a * b + c

def _fmax(a, b):
    if math.isnan(a):
        return b
    if math.isnan(b):
        return a
    return a if a > b else b

def _fmin(a, b):
    if math.isnan(a):
        return b
    if math.isnan(b):
        return a
    return a if a < b else b

def _round(x):
    return float(math.floor(x + 0.5)) if x >= 0.0 else float(math.ceil(x - 0.5))
"#;

struct PyEmitter {
    lines: Vec<String>,
    tmp: usize,
    env: Vec<(String, String)>,
}

impl PyEmitter {
    fn fresh(&mut self) -> String {
        self.tmp += 1;
        format!("_t{}", self.tmp - 1)
    }

    fn push(&mut self, indent: usize, line: String) {
        self.lines.push(format!("{}{}", "    ".repeat(indent), line));
    }

    fn lookup(&self, name: &str) -> String {
        self.env
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| "float(\"nan\")".to_string())
    }

    fn expr(&mut self, e: &Expr, indent: usize) -> String {
        match e {
            Expr::Num(v) => py_f64(*v),
            Expr::Var(name) => self.lookup(name),
            Expr::Op(op, args) => {
                let a: Vec<String> = args.iter().map(|arg| self.expr(arg, indent)).collect();
                apply(*op, &a)
            }
            Expr::If(cond, then, alt) => {
                let cond = self.expr(cond, indent);
                let out = self.fresh();
                self.push(indent, format!("if {}:", cond));
                let t = self.expr(then, indent + 1);
                self.push(indent + 1, format!("{} = {}", out, t));
                self.push(indent, "else:".to_string());
                let a = self.expr(alt, indent + 1);
                self.push(indent + 1, format!("{} = {}", out, a));
                out
            }
            Expr::Let {
                sequential,
                bindings,
                body,
            } => {
                let depth = self.env.len();
                if *sequential {
                    for (name, bound) in bindings {
                        let value = self.expr(bound, indent);
                        let tmp = self.fresh();
                        self.push(indent, format!("{} = {}", tmp, value));
                        self.env.push((name.clone(), tmp));
                    }
                } else {
                    let values: Vec<String> = bindings
                        .iter()
                        .map(|(_, bound)| {
                            let value = self.expr(bound, indent);
                            let tmp = self.fresh();
                            self.push(indent, format!("{} = {}", tmp, value));
                            tmp
                        })
                        .collect();
                    for ((name, _), tmp) in bindings.iter().zip(values) {
                        self.env.push((name.clone(), tmp));
                    }
                }
                let result = self.expr(body, indent);
                self.env.truncate(depth);
                result
            }
        }
    }
}

fn apply(op: Op, a: &[String]) -> String {
    match op {
        Op::Add => format!("({} + {})", a[0], a[1]),
        Op::Sub => format!("({} - {})", a[0], a[1]),
        Op::Mul => format!("({} * {})", a[0], a[1]),
        Op::Div => format!("({} / {})", a[0], a[1]),
        Op::Neg => format!("(-{})", a[0]),
        Op::Pow => format!("math.pow({}, {})", a[0], a[1]),
        Op::Sqrt => format!("math.sqrt({})", a[0]),
        Op::Cbrt => format!("_cbrt({})", a[0]),
        Op::Fabs => format!("math.fabs({})", a[0]),
        Op::Exp => format!("math.exp({})", a[0]),
        Op::Log => format!("math.log({})", a[0]),
        Op::Sin => format!("math.sin({})", a[0]),
        Op::Cos => format!("math.cos({})", a[0]),
        Op::Tan => format!("math.tan({})", a[0]),
        Op::Atan => format!("math.atan({})", a[0]),
        Op::Fma => format!("_fma({}, {}, {})", a[0], a[1], a[2]),
        Op::Fmax => format!("_fmax({}, {})", a[0], a[1]),
        Op::Fmin => format!("_fmin({}, {})", a[0], a[1]),
        Op::Floor => format!("float(math.floor({}))", a[0]),
        Op::Ceil => format!("float(math.ceil({}))", a[0]),
        Op::Round => format!("_round({})", a[0]),
        Op::Lt => format!("({} < {})", a[0], a[1]),
        Op::Le => format!("({} <= {})", a[0], a[1]),
        Op::Gt => format!("({} > {})", a[0], a[1]),
        Op::Ge => format!("({} >= {})", a[0], a[1]),
        Op::Eq => format!("({} == {})", a[0], a[1]),
        Op::Ne => format!("({} != {})", a[0], a[1]),
        Op::And => format!("({} and {})", a[0], a[1]),
        Op::Or => format!("({} or {})", a[0], a[1]),
        Op::Not => format!("(not {})", a[0]),
    }
}

fn py_f64(v: f64) -> String {
    if v.is_nan() {
        "float(\"nan\")".to_string()
    } else if v == f64::INFINITY {
        "float(\"inf\")".to_string()
    } else if v == f64::NEG_INFINITY {
        "float(\"-inf\")".to_string()
    } else {
        format!("{:.17e}", v)
    }
}

fn py_arg_names(core: &FPCore) -> Vec<String> {
    core.args
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let clean = name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.chars().next().map_or(false, |c| c.is_ascii_alphabetic());
            if clean && !matches!(name.as_str(), "if" | "else" | "and" | "or" | "not" | "def") {
                name.clone()
            } else {
                format!("a{}", i)
            }
        })
        .collect()
}

pub struct PythonPlatform;

impl Platform for PythonPlatform {
    fn name(&self) -> &'static str {
        "python"
    }

    fn driver_file(&self) -> &'static str {
        "driver.py"
    }

    fn supported_ops(&self) -> &'static [Op] {
        OPS
    }

    fn supports_branches(&self) -> bool {
        true
    }

    fn compile_core(&self, core: &FPCore) -> Result<CompiledCore> {
        check_ops(self, core)?;
        let names = py_arg_names(core);
        let mut emitter = PyEmitter {
            lines: Vec::new(),
            tmp: 0,
            env: core
                .args
                .iter()
                .cloned()
                .zip(names.iter().cloned())
                .collect(),
        };
        let result = emitter.expr(&core.expr, 1);
        let mut source = format!("def fpforge_kernel({}):\n", names.join(", "));
        for line in &emitter.lines {
            source.push_str(line);
            source.push('\n');
        }
        source.push_str(&format!("    return {}\n", result));
        Ok(CompiledCore {
            key: core.key.clone(),
            source,
        })
    }

    fn make_driver(
        &self,
        _core: &FPCore,
        compiled: &CompiledCore,
        sample: &Sample,
        _config: &RunnerConfig,
    ) -> String {
        let points: Vec<String> = sample
            .points
            .iter()
            .map(|p| {
                let vals: Vec<String> = p.iter().map(|v| py_f64(*v)).collect();
                format!("    [{}]", vals.join(", "))
            })
            .collect();
        let truths: Vec<String> = sample.ground_truth.iter().map(|v| py_f64(*v)).collect();

        format!(
            r#"import math
import sys
import time

POINTS = [
{points}
]

TRUTHS = [
    {truths}
]

{helpers}
{kernel}
def main():
    outs = []
    start = time.perf_counter_ns()
    for p in POINTS:
        try:
            outs.append(fpforge_kernel(*p))
        except (ArithmeticError, ValueError):
            outs.append(float("nan"))
    end = time.perf_counter_ns()

    bad = 0
    for got, want in zip(outs, TRUTHS):
        if math.isnan(want):
            if not math.isnan(got):
                bad += 1
        elif math.isnan(got) or abs(got - want) > 1e-9 * abs(want) + 1e-12:
            bad += 1
    if bad > len(POINTS) // 100:
        print("%d of %d outputs disagree with the reference" % (bad, len(POINTS)), file=sys.stderr)
        raise SystemExit(1)
    print(end - start)

main()
"#,
            points = points.join(",\n"),
            truths = truths.join(",\n    "),
            helpers = HELPERS,
            kernel = compiled.source,
        )
    }

    fn compile_command(&self, _dir: &Path) -> Option<Command> {
        None
    }

    fn run_command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("python3");
        cmd.arg(dir.join("driver.py"));
        cmd
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
    fn test_compile_emits_python_function() {
        let compiled = PythonPlatform
            .compile_core(&core("(FPCore (x) (sqrt (fabs x)))"))
            .unwrap();
        assert!(compiled.source.starts_with("def fpforge_kernel(x):"));
        assert!(compiled.source.contains("math.sqrt(math.fabs(x))"));
    }

    #[test]
    fn test_branches_lower_to_statements() {
        let compiled = PythonPlatform
            .compile_core(&core("(FPCore (x) (if (< x 0) 0 (sqrt x)))"))
            .unwrap();
        assert!(compiled.source.contains("if (x < 0.00000000000000000e0):"));
        assert!(compiled.source.contains("else:"));
    }

    #[test]
    fn test_driver_has_no_compile_step() {
        assert!(PythonPlatform.compile_command(Path::new("/tmp")).is_none());
    }
}
