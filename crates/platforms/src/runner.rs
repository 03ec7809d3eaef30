//! The platform-polymorphic pipeline facade.
//!
//! One `Runner` per run, built once from a backend, an optimizer
//! adapter, and an explicit configuration. Every stage preserves kernel
//! order because downstream stages zip by position.

use crate::driver::{self, DriverDir};
use crate::harness::{self, CompileOutcome, TimingResult};
use crate::{CompiledCore, Platform};
use fpforge_core::{
    pareto_frontier, Error, Expr, FPCore, ParetoFrontier, ParetoPoint, Provenance, Result,
    RunnerConfig, Sample,
};
use fpforge_herbie::{local_sample, AblationConfig, ImproveConfig, Improver};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Runner {
    platform: Box<dyn Platform>,
    improver: Box<dyn Improver>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        platform: Box<dyn Platform>,
        improver: Box<dyn Improver>,
        config: RunnerConfig,
    ) -> Runner {
        Runner {
            platform,
            improver,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    /// Parse kernels from a file or directory, in order.
    pub fn read(&self, path: &Path) -> Result<Vec<FPCore>> {
        let cores = fpforge_core::parse::read_path(path)?;
        info!(count = cores.len(), path = %path.display(), "read input kernels");
        Ok(cores)
    }

    /// A locally-generated kernel set with no external dependency: one
    /// tiny kernel per backend operation, plus an identity baseline for
    /// loop overhead.
    pub fn synthesize(&self) -> Vec<FPCore> {
        let names = ["x", "y", "z"];
        let args = move |n: usize| -> Vec<String> {
            names[..n].iter().map(|s| s.to_string()).collect()
        };
        let mut cores = vec![FPCore::new(
            "synth_baseline",
            args(1),
            Expr::Var("x".into()),
        )];
        for op in self.platform.supported_ops() {
            let vars: Vec<Expr> = args(op.arity())
                .into_iter()
                .map(Expr::Var)
                .collect();
            cores.push(FPCore::new(
                format!("synth_{}", op.slug()),
                args(op.arity()),
                Expr::Op(*op, vars),
            ));
        }
        for core in &mut cores {
            core.provenance = Provenance::Synthetic;
        }
        info!(count = cores.len(), "synthesized kernel set");
        cores
    }

    /// One entry per kernel, order preserving; `None` marks an
    /// unsamplable kernel. The optimizer's sampler is preferred since it
    /// knows the kernel's valid domain; the local generator is the
    /// debugging fallback and the safety net when the optimizer's
    /// sampler is unavailable.
    pub fn sample(&self, cores: &[FPCore], use_local: bool) -> Result<Vec<Option<Sample>>> {
        let mut samples = Vec::with_capacity(cores.len());
        for core in cores {
            let sample = if use_local {
                local_sample(core, self.config.num_points, self.config.seed)
            } else {
                match self
                    .improver
                    .sample_core(core, self.config.num_points, self.config.seed)
                {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!(key = %core.key, error = %e, "optimizer sampler failed; falling back to local sampling");
                        local_sample(core, self.config.num_points, self.config.seed)
                    }
                }
            };
            if sample.is_none() {
                warn!(key = %core.key, "kernel is unsamplable");
            }
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Synchronous call into the external optimizer. Output kernels are
    /// keyed and tagged by the configuration that produced them.
    pub fn improve(
        &self,
        cores: &[FPCore],
        threads: usize,
        localize: bool,
        use_legacy_cost: bool,
    ) -> Result<Vec<FPCore>> {
        let improve_config = ImproveConfig {
            threads,
            localize,
            use_legacy_cost,
            seed: self.config.seed,
        };
        let mut improved = self.improver.improve(cores, &improve_config)?;
        let provenance = if localize && !use_legacy_cost {
            Provenance::Improved
        } else {
            Provenance::Ablation(AblationConfig::name_for(localize, use_legacy_cost))
        };
        for core in &mut improved {
            core.key = format!("{}_{}", core.key, provenance.label());
            core.provenance = provenance.clone();
        }
        Ok(improved)
    }

    /// Frontier over the union of input and rewritten kernels, using the
    /// cost/error annotations attached after timing and analysis.
    pub fn pareto(&self, input_cores: &[FPCore], cores: &[FPCore]) -> ParetoFrontier {
        let points: Vec<ParetoPoint> = input_cores
            .iter()
            .chain(cores)
            .filter_map(|core| {
                Some(ParetoPoint {
                    cost: core.cost?,
                    error: core.error?,
                    key: core.key.clone(),
                })
            })
            .collect();
        pareto_frontier(points)
    }

    /// Pure per-kernel translation into the backend's idiom.
    pub fn compile(&self, cores: &[FPCore]) -> Result<Vec<CompiledCore>> {
        cores
            .iter()
            .map(|core| self.platform.compile_core(core))
            .collect()
    }

    /// One freshly-created, exclusively-owned directory per kernel.
    pub fn make_driver_dirs(&self, cores: &[FPCore]) -> Result<Vec<DriverDir>> {
        driver::make_driver_dirs(&self.config.working_dir.join("drivers"), cores)
    }

    /// Materialize one self-contained benchmark program per kernel.
    pub fn make_drivers(
        &self,
        cores: &[FPCore],
        dirs: &[DriverDir],
        samples: &[Sample],
    ) -> Result<()> {
        for ((core, dir), sample) in cores.iter().zip(dirs).zip(samples) {
            let compiled = self.platform.compile_core(core)?;
            let source = self
                .platform
                .make_driver(core, &compiled, sample, &self.config);
            fs::write(dir.path.join(self.platform.driver_file()), source)?;
        }
        info!(count = dirs.len(), "generated drivers");
        Ok(())
    }

    /// Invoke the backend toolchain per directory; failures are isolated
    /// and recorded, never aborting the batch.
    pub fn compile_drivers(&self, dirs: &[DriverDir]) -> Vec<CompileOutcome> {
        let outcomes = harness::compile_drivers(self.platform.as_ref(), dirs, &self.config);
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(failed, total = dirs.len(), "driver compilation failures");
        }
        outcomes
    }

    /// Execute and time each compiled driver; crashes and hangs yield
    /// failure sentinels for their kernel only.
    pub fn run_drivers(
        &self,
        dirs: &[DriverDir],
        compiled: &[CompileOutcome],
    ) -> Vec<TimingResult> {
        harness::run_drivers(self.platform.as_ref(), dirs, compiled, &self.config)
    }

    /// Attach per-point cost derived from the timing results. Kernels
    /// whose driver failed keep no cost. Recomputation with unchanged
    /// timings yields unchanged annotations.
    pub fn cost(&self, cores: &mut [FPCore], times: &[TimingResult]) {
        for (core, time) in cores.iter_mut().zip(times) {
            core.cost = time
                .nanos()
                .map(|nanos| nanos / self.config.num_points as f64);
        }
    }

    /// Attach per-kernel error from the optimizer's high-precision
    /// reference.
    pub fn error(&self, cores: &mut [FPCore], samples: &[Sample]) -> Result<()> {
        let errors = self.improver.analyze(cores, samples)?;
        for (core, error) in cores.iter_mut().zip(errors) {
            core.error = Some(error);
        }
        Ok(())
    }

    /// Serialize a report into the working directory (under the run key
    /// when one is configured).
    pub fn write_report(&self, file_name: &str, report: &impl Serialize) -> Result<PathBuf> {
        let dir = self.config.report_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        let blob = serde_json::to_vec_pretty(report)
            .map_err(|e| Error::Config(format!("cannot serialize report: {}", e)))?;
        fs::write(&path, blob)?;
        info!(path = %path.display(), "wrote report");
        Ok(path)
    }

    /// Drop per-kernel working directories unless the run retains them.
    pub fn cleanup(&self) -> Result<()> {
        if !self.config.keep_artifacts {
            let root = self.config.working_dir.join("drivers");
            if root.exists() {
                fs::remove_dir_all(root)?;
            }
        }
        Ok(())
    }
}
