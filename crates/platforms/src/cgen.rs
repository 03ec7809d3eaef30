//! Scalar C code generation: kernel functions and benchmark drivers.
//!
//! Shared by the generic-arithmetic and native backends, which differ
//! only in whether libm is available. Lowering is statement-based so
//! that `let` bindings become temporaries and `if` stays a real branch
//! (branches guard domains; hoisting their arms would change behavior).

use fpforge_core::{Expr, FPCore, Op, Sample};

/// A C identifier for each kernel argument, stable across calls.
pub fn arg_names(core: &FPCore) -> Vec<String> {
    core.args
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let clean = name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.chars().next().map_or(false, |c| c.is_ascii_alphabetic());
            if clean && !matches!(name.as_str(), "if" | "else" | "do" | "for" | "int" | "double") {
                name.clone()
            } else {
                format!("a{}", i)
            }
        })
        .collect()
}

/// Exact-enough C literal for an f64 (17 significant digits round-trip).
pub fn format_f64(v: f64) -> String {
    if v.is_nan() {
        "(0.0 / 0.0)".to_string()
    } else if v == f64::INFINITY {
        "(1.0 / 0.0)".to_string()
    } else if v == f64::NEG_INFINITY {
        "(-1.0 / 0.0)".to_string()
    } else {
        format!("{:.17e}", v)
    }
}

struct Emitter {
    libm: bool,
    lines: Vec<String>,
    tmp: usize,
    env: Vec<(String, String)>,
}

impl Emitter {
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
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| "(0.0 / 0.0)".to_string())
    }

    fn expr(&mut self, e: &Expr, indent: usize) -> String {
        match e {
            Expr::Num(v) => format_f64(*v),
            Expr::Var(name) => self.lookup(name),
            Expr::Op(op, args) => {
                let a: Vec<String> = args.iter().map(|arg| self.expr(arg, indent)).collect();
                self.apply(*op, &a)
            }
            Expr::If(cond, then, alt) => {
                let cond = self.expr(cond, indent);
                let out = self.fresh();
                self.push(indent, format!("double {};", out));
                self.push(indent, format!("if ({}) {{", cond));
                let t = self.expr(then, indent + 1);
                self.push(indent + 1, format!("{} = {};", out, t));
                self.push(indent, "} else {".to_string());
                let a = self.expr(alt, indent + 1);
                self.push(indent + 1, format!("{} = {};", out, a));
                self.push(indent, "}".to_string());
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
                        self.push(indent, format!("double {} = {};", tmp, value));
                        self.env.push((name.clone(), tmp));
                    }
                } else {
                    let values: Vec<String> = bindings
                        .iter()
                        .map(|(_, bound)| {
                            let value = self.expr(bound, indent);
                            let tmp = self.fresh();
                            self.push(indent, format!("double {} = {};", tmp, value));
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

    fn apply(&self, op: Op, a: &[String]) -> String {
        match op {
            Op::Add => format!("({} + {})", a[0], a[1]),
            Op::Sub => format!("({} - {})", a[0], a[1]),
            Op::Mul => format!("({} * {})", a[0], a[1]),
            Op::Div => format!("({} / {})", a[0], a[1]),
            Op::Neg => format!("(-{})", a[0]),
            Op::Lt => format!("({} < {})", a[0], a[1]),
            Op::Le => format!("({} <= {})", a[0], a[1]),
            Op::Gt => format!("({} > {})", a[0], a[1]),
            Op::Ge => format!("({} >= {})", a[0], a[1]),
            Op::Eq => format!("({} == {})", a[0], a[1]),
            Op::Ne => format!("({} != {})", a[0], a[1]),
            Op::And => format!("({} && {})", a[0], a[1]),
            Op::Or => format!("({} || {})", a[0], a[1]),
            Op::Not => format!("(!{})", a[0]),
            Op::Fabs if !self.libm => format!("({0} < 0.0 ? -{0} : {0})", a[0]),
            Op::Fmax if !self.libm => format!("({0} > {1} ? {0} : {1})", a[0], a[1]),
            Op::Fmin if !self.libm => format!("({0} < {1} ? {0} : {1})", a[0], a[1]),
            // libm call; on a libm-less backend this only appears for
            // operations the platform already rejected
            other => format!("{}({})", other.name(), a.join(", ")),
        }
    }
}

/// Emit `static double fpforge_kernel(...)` for a kernel.
pub fn compile_scalar(core: &FPCore, libm: bool) -> String {
    let names = arg_names(core);
    let mut emitter = Emitter {
        libm,
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

    let params = if names.is_empty() {
        "void".to_string()
    } else {
        names
            .iter()
            .map(|n| format!("double {}", n))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut out = format!("static double fpforge_kernel({}) {{\n", params);
    for line in &emitter.lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("    return {};\n}}\n", result));
    out
}

/// The embedded input table: one row per point.
pub fn points_table(sample: &Sample, arity: usize) -> String {
    let cols = arity.max(1);
    let rows: Vec<String> = sample
        .points
        .iter()
        .map(|p| {
            let vals: Vec<String> = (0..cols)
                .map(|i| format_f64(p.get(i).copied().unwrap_or(0.0)))
                .collect();
            format!("    {{{}}}", vals.join(", "))
        })
        .collect();
    rows.join(",\n")
}

pub fn truths_table(sample: &Sample) -> String {
    let vals: Vec<String> = sample.ground_truth.iter().map(|v| format_f64(*v)).collect();
    format!("    {}", vals.join(",\n    "))
}

/// A complete scalar benchmark driver: embedded points and reference
/// outputs, one timed pass over all points, a tolerance check, and the
/// elapsed nanoseconds on stdout.
pub fn scalar_driver(core: &FPCore, kernel: &str, sample: &Sample, libm: bool) -> String {
    let n = sample.points.len();
    let cols = core.arity().max(1);
    let math_include = if libm { "#include <math.h>\n" } else { "" };
    let call_args: Vec<String> = (0..core.arity())
        .map(|i| format!("points[i][{}]", i))
        .collect();
    let call = format!("fpforge_kernel({})", call_args.join(", "));

    format!(
        r#"#include <stdio.h>
#include <time.h>
{math_include}
#define N_POINTS {n}

static const double points[N_POINTS][{cols}] = {{
{points}
}};

static const double truths[N_POINTS] = {{
{truths}
}};

static double outs[N_POINTS];

{kernel}
int main(void) {{
    struct timespec start, end;
    clock_gettime(CLOCK_MONOTONIC, &start);
    for (int i = 0; i < N_POINTS; i++) {{
        outs[i] = {call};
    }}
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
        math_include = math_include,
        n = n,
        cols = cols,
        points = points_table(sample, core.arity()),
        truths = truths_table(sample),
        kernel = kernel,
        call = call,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpforge_core::parse::parse_cores;
    use std::path::Path;

    fn core(text: &str) -> FPCore {
        parse_cores(text, Path::new("<test>")).unwrap().remove(0)
    }

    fn sample(points: Vec<Vec<f64>>, gt: Vec<f64>) -> Sample {
        Sample {
            points,
            ground_truth: gt,
        }
    }

    #[test]
    fn test_compile_scalar_libm() {
        let src = compile_scalar(&core("(FPCore (x y) (+ (sqrt x) y))"), true);
        assert!(src.contains("static double fpforge_kernel(double x, double y)"));
        assert!(src.contains("sqrt(x)"));
    }

    #[test]
    fn test_compile_scalar_without_libm_uses_ternary_fabs() {
        let src = compile_scalar(&core("(FPCore (x) (fabs x))"), false);
        assert!(src.contains("x < 0.0 ? -x : x"));
        assert!(!src.contains("fabs("));
    }

    #[test]
    fn test_compile_scalar_lowers_let_and_if() {
        let src = compile_scalar(
            &core("(FPCore (x) (let ([t (* x x)]) (if (< t 1) t (/ 1 t))))"),
            true,
        );
        assert!(src.contains("double _t0 = (x * x);"));
        assert!(src.contains("if ((_t0 < 1.00000000000000000e0)) {"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let c = core("(FPCore (x) (exp (neg (* x x))))");
        assert_eq!(compile_scalar(&c, true), compile_scalar(&c, true));
    }

    #[test]
    fn test_driver_embeds_points_and_truths() {
        let c = core("(FPCore (x) (* x 2))");
        let kernel = compile_scalar(&c, true);
        let s = sample(vec![vec![1.5], vec![-3.0]], vec![3.0, -6.0]);
        let driver = scalar_driver(&c, &kernel, &s, true);
        assert!(driver.contains("#define N_POINTS 2"));
        assert!(driver.contains("1.50000000000000000e0"));
        assert!(driver.contains("-6.00000000000000000e0"));
        assert!(driver.contains("CLOCK_MONOTONIC"));
    }
}
