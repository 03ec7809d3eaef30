//! Fault isolation across a driver batch: one broken driver must not
//! take down timings for its neighbors.
//!
//! Uses a scripted stub platform (shell drivers) so the test exercises
//! the real compile/run/timeout machinery without a C toolchain.

use fpforge_core::{Error, Expr, FPCore, Op, Provenance, Result, RunnerConfig, Sample};
use fpforge_herbie::LocalImprover;
use fpforge_platforms::{
    CompileOutcome, CompiledCore, FailStage, Platform, Runner, TimingResult,
};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Drivers are POSIX shell scripts; behavior is keyed off the kernel key.
struct ScriptPlatform;

impl Platform for ScriptPlatform {
    fn name(&self) -> &'static str {
        "script"
    }

    fn driver_file(&self) -> &'static str {
        "driver.sh"
    }

    fn supported_ops(&self) -> &'static [Op] {
        &[Op::Add, Op::Sub, Op::Mul, Op::Div, Op::Neg]
    }

    fn supports_branches(&self) -> bool {
        true
    }

    fn compile_core(&self, core: &FPCore) -> Result<CompiledCore> {
        Ok(CompiledCore {
            key: core.key.clone(),
            source: core.expr.to_string(),
        })
    }

    fn make_driver(
        &self,
        core: &FPCore,
        _compiled: &CompiledCore,
        _sample: &Sample,
        _config: &RunnerConfig,
    ) -> String {
        if core.key.contains("badcompile") {
            // unterminated quote: fails the syntax check
            "echo \"oops\n".to_string()
        } else if core.key.contains("badrun") {
            "exit 3\n".to_string()
        } else if core.key.contains("hang") {
            "sleep 30\n".to_string()
        } else {
            // deterministic fake timing derived from the key length
            format!("echo {}\n", 1000 + core.key.len() * 7)
        }
    }

    fn compile_command(&self, dir: &Path) -> Option<Command> {
        let mut cmd = Command::new("sh");
        cmd.arg("-n").arg(dir.join("driver.sh"));
        Some(cmd)
    }

    fn run_command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg(dir.join("driver.sh"));
        cmd
    }
}

fn kernel(key: &str) -> FPCore {
    let mut core = FPCore::new(key, vec!["x".into()], Expr::Var("x".into()));
    core.provenance = Provenance::Input;
    core
}

fn sample(n: usize) -> Sample {
    Sample {
        points: vec![vec![1.0]; n],
        ground_truth: vec![1.0; n],
    }
}

fn runner(dir: &Path) -> Runner {
    let mut config = RunnerConfig::new(dir);
    config.num_points = 4;
    config.num_runs = 2;
    config.threads = 2;
    config.driver_timeout = Duration::from_millis(400);
    Runner::new(Box::new(ScriptPlatform), Box::new(LocalImprover), config)
}

#[test]
fn broken_drivers_stay_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = runner(tmp.path());

    let cores = vec![
        kernel("ok_one"),
        kernel("badcompile"),
        kernel("ok_two"),
        kernel("badrun"),
        kernel("hang"),
    ];
    let samples = vec![sample(4); cores.len()];

    let dirs = runner.make_driver_dirs(&cores).unwrap();
    runner.make_drivers(&cores, &dirs, &samples).unwrap();

    let outcomes = runner.compile_drivers(&dirs);
    assert!(outcomes[0].is_ok());
    assert!(matches!(outcomes[1], CompileOutcome::Failed(_)));
    assert!(outcomes[2].is_ok());

    let times = runner.run_drivers(&dirs, &outcomes);
    assert_eq!(times.len(), cores.len());
    assert!(matches!(times[0], TimingResult::Timed { .. }));
    assert!(matches!(
        times[1],
        TimingResult::Failed {
            stage: FailStage::Compile,
            ..
        }
    ));
    assert!(matches!(times[2], TimingResult::Timed { .. }));
    assert!(matches!(
        times[3],
        TimingResult::Failed {
            stage: FailStage::Run,
            ..
        }
    ));
    assert!(matches!(
        times[4],
        TimingResult::Failed {
            stage: FailStage::Timeout,
            ..
        }
    ));

    // cost lands only on the kernels that produced timings
    let mut cores = cores;
    runner.cost(&mut cores, &times);
    assert!(cores[0].cost.is_some());
    assert!(cores[1].cost.is_none());
    assert!(cores[2].cost.is_some());
    assert!(cores[3].cost.is_none());
    assert!(cores[4].cost.is_none());
}

#[test]
fn driver_dirs_collide_on_reuse() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = runner(tmp.path());
    let cores = vec![kernel("solo")];
    runner.make_driver_dirs(&cores).unwrap();
    let err = runner.make_driver_dirs(&cores).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn timings_are_deterministic_scripts() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = runner(tmp.path());
    let cores = vec![kernel("steady")];
    let samples = vec![sample(4)];
    let dirs = runner.make_driver_dirs(&cores).unwrap();
    runner.make_drivers(&cores, &dirs, &samples).unwrap();
    let outcomes = runner.compile_drivers(&dirs);
    let times = runner.run_drivers(&dirs, &outcomes);
    match &times[0] {
        TimingResult::Timed { nanos, runs } => {
            assert_eq!(*runs, 2);
            assert_eq!(*nanos, 1000.0 + "steady".len() as f64 * 7.0);
        }
        other => panic!("expected a timing, got {:?}", other),
    }
}
