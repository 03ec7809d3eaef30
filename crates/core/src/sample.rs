//! Input samples and their invariants.

use crate::error::{Error, Result};
use crate::fpcore::FPCore;
use serde::{Deserialize, Serialize};

/// A set of input points for one kernel, plus the reference output for
/// each point. Owned by exactly one kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// One inner vector per input point; inner length equals the owning
    /// kernel's arity.
    pub points: Vec<Vec<f64>>,
    /// Host-side reference output per point, index-aligned with `points`.
    pub ground_truth: Vec<f64>,
}

impl Sample {
    /// Enforce the sampling invariants against the owning kernel: every
    /// point has the kernel's arity and the cardinality matches the
    /// configured point count. A violation is an upstream bug, not a
    /// recoverable condition.
    pub fn check(&self, core: &FPCore, num_points: usize) -> Result<()> {
        if self.points.len() != num_points {
            return Err(Error::SampleInvariant {
                key: core.key.clone(),
                reason: format!("{} points, expected {}", self.points.len(), num_points),
            });
        }
        if self.ground_truth.len() != self.points.len() {
            return Err(Error::SampleInvariant {
                key: core.key.clone(),
                reason: format!(
                    "{} reference outputs for {} points",
                    self.ground_truth.len(),
                    self.points.len()
                ),
            });
        }
        if let Some(bad) = self.points.iter().find(|p| p.len() != core.arity()) {
            return Err(Error::SampleInvariant {
                key: core.key.clone(),
                reason: format!("point arity {}, kernel arity {}", bad.len(), core.arity()),
            });
        }
        Ok(())
    }
}

/// Drop exactly the kernels whose sample is `None`, keeping the two
/// sequences index-aligned. Unsamplable kernels are pruned, not fatal.
pub fn prune_unsamplable(
    samples: Vec<Option<Sample>>,
    cores: Vec<FPCore>,
) -> (Vec<Sample>, Vec<FPCore>) {
    let mut kept_samples = Vec::with_capacity(cores.len());
    let mut kept_cores = Vec::with_capacity(cores.len());
    for (sample, core) in samples.into_iter().zip(cores) {
        if let Some(sample) = sample {
            kept_samples.push(sample);
            kept_cores.push(core);
        }
    }
    (kept_samples, kept_cores)
}

/// Sanity check a batch: every kernel must have a valid sample.
pub fn check_samples(samples: &[Sample], cores: &[FPCore], num_points: usize) -> Result<()> {
    if samples.len() != cores.len() {
        return Err(Error::SampleInvariant {
            key: "<batch>".into(),
            reason: format!("{} samples for {} kernels", samples.len(), cores.len()),
        });
    }
    for (sample, core) in samples.iter().zip(cores) {
        sample.check(core, num_points)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn core(key: &str, arity: usize) -> FPCore {
        let args = (0..arity).map(|i| format!("x{}", i)).collect();
        FPCore::new(key, args, Expr::Num(0.0))
    }

    fn sample(points: usize, arity: usize) -> Sample {
        Sample {
            points: vec![vec![1.0; arity]; points],
            ground_truth: vec![0.0; points],
        }
    }

    #[test]
    fn test_check_accepts_matching_sample() {
        assert!(sample(10, 2).check(&core("k", 2), 10).is_ok());
    }

    #[test]
    fn test_check_rejects_arity_mismatch() {
        let err = sample(10, 3).check(&core("k", 2), 10).unwrap_err();
        assert!(matches!(err, Error::SampleInvariant { .. }));
    }

    #[test]
    fn test_check_rejects_cardinality_mismatch() {
        assert!(sample(9, 2).check(&core("k", 2), 10).is_err());
    }

    #[test]
    fn test_prune_keeps_alignment() {
        let cores = vec![core("a", 1), core("b", 1), core("c", 1)];
        let samples = vec![Some(sample(5, 1)), None, Some(sample(5, 1))];
        let (samples, cores) = prune_unsamplable(samples, cores);
        assert_eq!(samples.len(), 2);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].key, "a");
        assert_eq!(cores[1].key, "c");
    }
}
