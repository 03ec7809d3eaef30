//! Optimizer adapter: a narrow, injectable interface to the external
//! accuracy optimizer, with a process-spawning implementation and a
//! deterministic local one (no external process) for debugging and tests.

use fpforge_core::{Error, Expr, FPCore, Op, Result, Sample};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// Configuration for one optimizer invocation.
#[derive(Debug, Clone, Copy)]
pub struct ImproveConfig {
    pub threads: usize,
    pub localize: bool,
    pub use_legacy_cost: bool,
    pub seed: u64,
}

/// A named optimizer configuration for ablation studies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AblationConfig {
    pub name: String,
    pub localize: bool,
    pub use_legacy_cost: bool,
}

impl AblationConfig {
    /// The fixed configuration set. The first entry is the baseline.
    pub fn standard() -> Vec<AblationConfig> {
        let cfg = |name: &str, localize, use_legacy_cost| AblationConfig {
            name: name.to_string(),
            localize,
            use_legacy_cost,
        };
        vec![
            cfg("default", true, false),
            cfg("no-cost", true, true),
            cfg("no-localize", false, false),
            cfg("no-cost-no-localize", false, true),
        ]
    }

    /// Resolve the config name for a flag pair.
    pub fn name_for(localize: bool, use_legacy_cost: bool) -> String {
        Self::standard()
            .into_iter()
            .find(|c| c.localize == localize && c.use_legacy_cost == use_legacy_cost)
            .map(|c| c.name)
            .expect("the flag pairs cover all combinations")
    }
}

/// The optimizer seen from this system: improve a kernel set, sample a
/// kernel's input domain, and measure error against a high-precision
/// reference. Implementations must be substitutable with a deterministic
/// stub in tests.
pub trait Improver: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite `cores` under `config`. Synchronous for the duration of
    /// the external process; any failure is fatal to the run.
    fn improve(&self, cores: &[FPCore], config: &ImproveConfig) -> Result<Vec<FPCore>>;

    /// Sample the kernel's valid input domain. `Ok(None)` marks the
    /// kernel unsamplable, which is non-fatal upstream.
    fn sample_core(&self, core: &FPCore, num_points: usize, seed: u64) -> Result<Option<Sample>>;

    /// Per-kernel error versus the optimizer's high-precision reference.
    fn analyze(&self, cores: &[FPCore], samples: &[Sample]) -> Result<Vec<f64>>;
}

/// Wire format for sampling and error analysis output.
#[derive(Debug, Serialize, Deserialize)]
struct WireSample {
    points: Vec<Vec<f64>>,
    gt: Vec<f64>,
}

/// Spawns the external optimizer binary. The binary path comes from
/// `$FPFORGE_HERBIE` (default `herbie`); kernels travel as FPCore text,
/// samples and error tables as JSON on stdout.
pub struct HerbieProcess {
    binary: PathBuf,
    scratch: PathBuf,
}

impl HerbieProcess {
    pub fn new(binary: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        HerbieProcess {
            binary: binary.into(),
            scratch: scratch.into(),
        }
    }

    pub fn from_env(scratch: impl Into<PathBuf>) -> Self {
        let binary = std::env::var("FPFORGE_HERBIE").unwrap_or_else(|_| "herbie".into());
        Self::new(binary, scratch)
    }

    fn scratch_file(&self, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.scratch)?;
        Ok(self.scratch.join(name))
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!(binary = %self.binary.display(), ?args, "invoking optimizer");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| Error::Optimizer(format!("cannot spawn {}: {}", self.binary.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Optimizer(format!(
                "`{} {}` exited with {}: {}",
                self.binary.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl Improver for HerbieProcess {
    fn name(&self) -> &str {
        "herbie"
    }

    fn improve(&self, cores: &[FPCore], config: &ImproveConfig) -> Result<Vec<FPCore>> {
        let input = self.scratch_file("improve-input.fpcore")?;
        let output = self.scratch_file("improve-output.fpcore")?;
        write_cores(&input, cores)?;

        let seed = config.seed.to_string();
        let threads = config.threads.to_string();
        let input_str = input.to_string_lossy().into_owned();
        let output_str = output.to_string_lossy().into_owned();
        let mut args: Vec<&str> = vec![
            "improve",
            "--seed",
            seed.as_str(),
            "--threads",
            threads.as_str(),
        ];
        if !config.localize {
            args.extend(["--disable", "localize"]);
        }
        if config.use_legacy_cost {
            args.push("--old-cost");
        }
        args.push(input_str.as_str());
        args.push(output_str.as_str());

        info!(
            kernels = cores.len(),
            threads = config.threads,
            localize = config.localize,
            legacy_cost = config.use_legacy_cost,
            "running optimizer improve"
        );
        self.run(&args)?;

        let text = fs::read_to_string(&output)
            .map_err(|e| Error::Optimizer(format!("cannot read optimizer output: {}", e)))?;
        let improved = fpforge_core::parse::parse_cores(&text, &output)
            .map_err(|e| Error::Optimizer(format!("unparseable optimizer output: {}", e)))?;
        if improved.len() != cores.len() {
            return Err(Error::Optimizer(format!(
                "optimizer returned {} kernels for {} inputs",
                improved.len(),
                cores.len()
            )));
        }
        Ok(link_outputs(cores, improved))
    }

    fn sample_core(&self, core: &FPCore, num_points: usize, seed: u64) -> Result<Option<Sample>> {
        let input = self.scratch_file("sample-input.fpcore")?;
        fs::write(&input, core.to_text())?;
        let seed = seed.to_string();
        let num_points = num_points.to_string();
        let input_str = input.to_string_lossy().into_owned();
        let stdout = self.run(&[
            "sample",
            "--seed",
            seed.as_str(),
            "--num-points",
            num_points.as_str(),
            input_str.as_str(),
        ])?;
        let wire: Option<WireSample> = serde_json::from_slice(&stdout)
            .map_err(|e| Error::Optimizer(format!("unparseable sample output: {}", e)))?;
        Ok(wire.map(|w| Sample {
            points: w.points,
            ground_truth: w.gt,
        }))
    }

    fn analyze(&self, cores: &[FPCore], samples: &[Sample]) -> Result<Vec<f64>> {
        let input = self.scratch_file("error-input.fpcore")?;
        let points = self.scratch_file("error-points.json")?;
        write_cores(&input, cores)?;
        let wire: Vec<WireSample> = samples
            .iter()
            .map(|s| WireSample {
                points: s.points.clone(),
                gt: s.ground_truth.clone(),
            })
            .collect();
        let blob = serde_json::to_vec(&wire)
            .map_err(|e| Error::Optimizer(format!("cannot serialize samples: {}", e)))?;
        fs::write(&points, blob)?;

        let input_str = input.to_string_lossy().into_owned();
        let points_str = points.to_string_lossy().into_owned();
        let stdout = self.run(&["error", input_str.as_str(), points_str.as_str()])?;
        let errors: Vec<f64> = serde_json::from_slice(&stdout)
            .map_err(|e| Error::Optimizer(format!("unparseable error output: {}", e)))?;
        if errors.len() != cores.len() {
            return Err(Error::Optimizer(format!(
                "optimizer returned {} errors for {} kernels",
                errors.len(),
                cores.len()
            )));
        }
        Ok(errors)
    }
}

fn write_cores(path: &std::path::Path, cores: &[FPCore]) -> Result<()> {
    let text: Vec<String> = cores.iter().map(|c| c.to_text()).collect();
    fs::write(path, text.join("\n"))?;
    Ok(())
}

fn link_outputs(inputs: &[FPCore], improved: Vec<FPCore>) -> Vec<FPCore> {
    // optimizer output is positional: entry i rewrites input i
    improved
        .into_iter()
        .zip(inputs)
        .map(|(mut out, origin)| {
            out.key = origin.key.clone();
            out.name = origin.name.clone();
            out.origin = Some(origin.key.clone());
            out
        })
        .collect()
}

/// Deterministic in-process improver: applies a couple of cheap local
/// rewrites instead of calling out. Useful for debugging the pipeline
/// without the optimizer installed; configurations still produce
/// distinguishable rewrites.
pub struct LocalImprover;

impl Improver for LocalImprover {
    fn name(&self) -> &str {
        "local"
    }

    fn improve(&self, cores: &[FPCore], config: &ImproveConfig) -> Result<Vec<FPCore>> {
        let improved = cores
            .iter()
            .map(|core| {
                let mut expr = core.expr.clone();
                if !config.use_legacy_cost {
                    expr = fold_constants(expr);
                }
                if config.localize {
                    expr = fuse_fma(expr);
                }
                let mut out = core.clone();
                out.expr = expr;
                out.origin = Some(core.key.clone());
                out.cost = None;
                out.error = None;
                out
            })
            .collect();
        Ok(improved)
    }

    fn sample_core(&self, core: &FPCore, num_points: usize, seed: u64) -> Result<Option<Sample>> {
        Ok(crate::sampler::local_sample(core, num_points, seed))
    }

    fn analyze(&self, cores: &[FPCore], samples: &[Sample]) -> Result<Vec<f64>> {
        // deviation of the kernel's own f64 semantics from the sample's
        // reference outputs
        let mut errors = Vec::with_capacity(cores.len());
        for (core, sample) in cores.iter().zip(samples) {
            let mut env = std::collections::HashMap::new();
            let mut total = 0.0;
            for (point, gt) in sample.points.iter().zip(&sample.ground_truth) {
                for (arg, v) in core.args.iter().zip(point) {
                    env.insert(arg.clone(), *v);
                }
                let got = core.expr.eval(&env);
                let diff = (got - gt).abs();
                if diff.is_finite() {
                    total += diff;
                } else {
                    total += 1.0;
                }
            }
            errors.push(total / sample.points.len().max(1) as f64);
        }
        Ok(errors)
    }
}

fn fold_constants(expr: Expr) -> Expr {
    match expr {
        Expr::Op(op, args) => {
            let args: Vec<Expr> = args.into_iter().map(fold_constants).collect();
            let folded = Expr::Op(op, args);
            if let Expr::Op(op, args) = &folded {
                if !op.is_predicate() && args.iter().all(|a| matches!(a, Expr::Num(_))) {
                    let v = folded.eval(&std::collections::HashMap::new());
                    if v.is_finite() {
                        return Expr::Num(v);
                    }
                }
            }
            folded
        }
        Expr::If(c, t, e) => Expr::If(
            Box::new(fold_constants(*c)),
            Box::new(fold_constants(*t)),
            Box::new(fold_constants(*e)),
        ),
        Expr::Let {
            sequential,
            bindings,
            body,
        } => Expr::Let {
            sequential,
            bindings: bindings
                .into_iter()
                .map(|(n, e)| (n, fold_constants(e)))
                .collect(),
            body: Box::new(fold_constants(*body)),
        },
        other => other,
    }
}

fn fuse_fma(expr: Expr) -> Expr {
    match expr {
        Expr::Op(Op::Add, args) => {
            let mut args: Vec<Expr> = args.into_iter().map(fuse_fma).collect();
            let c = args.pop().expect("binary add");
            let lhs = args.pop().expect("binary add");
            if let Expr::Op(Op::Mul, mul_args) = lhs {
                let mut mul_args = mul_args;
                let b = mul_args.pop().expect("binary mul");
                let a = mul_args.pop().expect("binary mul");
                Expr::Op(Op::Fma, vec![a, b, c])
            } else {
                Expr::Op(Op::Add, vec![lhs, c])
            }
        }
        Expr::Op(op, args) => Expr::Op(op, args.into_iter().map(fuse_fma).collect()),
        Expr::If(c, t, e) => Expr::If(
            Box::new(fuse_fma(*c)),
            Box::new(fuse_fma(*t)),
            Box::new(fuse_fma(*e)),
        ),
        Expr::Let {
            sequential,
            bindings,
            body,
        } => Expr::Let {
            sequential,
            bindings: bindings.into_iter().map(|(n, e)| (n, fuse_fma(e))).collect(),
            body: Box::new(fuse_fma(*body)),
        },
        other => other,
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

    fn config(localize: bool, legacy: bool) -> ImproveConfig {
        ImproveConfig {
            threads: 1,
            localize,
            use_legacy_cost: legacy,
            seed: 1,
        }
    }

    #[test]
    fn test_standard_ablation_set() {
        let set = AblationConfig::standard();
        assert_eq!(set.len(), 4);
        assert_eq!(set[0].name, "default");
        assert_eq!(AblationConfig::name_for(false, true), "no-cost-no-localize");
    }

    #[test]
    fn test_local_improver_links_origin() {
        let cores = vec![core("(FPCore (x y) (+ (* x y) 1))")];
        let out = LocalImprover.improve(&cores, &config(true, false)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].origin.as_deref(), Some(cores[0].key.as_str()));
        assert_eq!(out[0].expr.to_string(), "(fma x y 1)");
    }

    #[test]
    fn test_local_improver_configs_differ() {
        let cores = vec![core("(FPCore (x) (+ (* x x) (* 2 3)))")];
        let fused = LocalImprover.improve(&cores, &config(true, false)).unwrap();
        let bare = LocalImprover.improve(&cores, &config(false, true)).unwrap();
        assert_eq!(fused[0].expr.to_string(), "(fma x x 6)");
        assert_eq!(bare[0].expr.to_string(), cores[0].expr.to_string());
    }

    #[test]
    fn test_local_analyze_zero_for_reference_sample() {
        let c = core("(FPCore (x) (* x 2))");
        let sample = Sample {
            points: vec![vec![1.0], vec![3.0]],
            ground_truth: vec![2.0, 6.0],
        };
        let errors = LocalImprover.analyze(&[c], &[sample]).unwrap();
        assert_eq!(errors, vec![0.0]);
    }
}
