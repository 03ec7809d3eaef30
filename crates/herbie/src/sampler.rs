//! Fallback input sampler.
//!
//! The optimizer's own sampler is preferred because it understands the
//! kernel's valid domain; this local generator exists for debugging and
//! for running without the optimizer installed. It draws candidate
//! points from a wide log-uniform magnitude range, rejects points whose
//! precondition fails or whose result is non-finite, and gives up once
//! a fixed retry budget is exhausted.

use fpforge_core::{FPCore, Sample};
use std::collections::HashMap;
use tracing::debug;

/// Rejection attempts allowed per requested point.
const ATTEMPTS_PER_POINT: usize = 100;

/// Sample `num_points` valid input points for `core`, or `None` when the
/// budget runs out (the kernel is unsamplable and gets pruned upstream).
pub fn local_sample(core: &FPCore, num_points: usize, seed: u64) -> Option<Sample> {
    let mut rng = fastrand::Rng::with_seed(seed ^ key_hash(&core.key));
    let mut env: HashMap<String, f64> = HashMap::with_capacity(core.arity());
    let mut points = Vec::with_capacity(num_points);
    let mut ground_truth = Vec::with_capacity(num_points);
    let mut budget = ATTEMPTS_PER_POINT.saturating_mul(num_points);

    while points.len() < num_points {
        if budget == 0 {
            debug!(key = %core.key, got = points.len(), want = num_points, "sampling budget exhausted");
            return None;
        }
        budget -= 1;

        let point: Vec<f64> = (0..core.arity()).map(|_| draw(&mut rng)).collect();
        for (arg, v) in core.args.iter().zip(&point) {
            env.insert(arg.clone(), *v);
        }
        if let Some(pre) = &core.pre {
            if pre.eval(&env) == 0.0 {
                continue;
            }
        }
        let out = core.expr.eval(&env);
        if !out.is_finite() {
            continue;
        }
        points.push(point);
        ground_truth.push(out);
    }

    Some(Sample {
        points,
        ground_truth,
    })
}

/// Log-uniform magnitude in [2^-60, 2^60] with random sign; covers many
/// orders of magnitude without concentrating mass at huge values.
fn draw(rng: &mut fastrand::Rng) -> f64 {
    let exponent = rng.f64() * 120.0 - 60.0;
    let magnitude = exponent.exp2() * (1.0 + rng.f64());
    if rng.bool() {
        magnitude
    } else {
        -magnitude
    }
}

fn key_hash(key: &str) -> u64 {
    // FNV-1a, so per-kernel streams differ under the same seed
    let mut h: u64 = 0xcbf29ce484222325;
    for b in key.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x100000001b3);
    }
    h
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
    fn test_sample_arity_and_cardinality() {
        let unary = core("(FPCore (x) (* x 2))");
        let binary = core("(FPCore (x y) (+ x y))");
        let s1 = local_sample(&unary, 100, 1).expect("samplable");
        let s2 = local_sample(&binary, 100, 1).expect("samplable");
        assert_eq!(s1.points.len(), 100);
        assert_eq!(s2.points.len(), 100);
        assert!(s1.points.iter().all(|p| p.len() == 1));
        assert!(s2.points.iter().all(|p| p.len() == 2));
        s1.check(&unary, 100).unwrap();
        s2.check(&binary, 100).unwrap();
    }

    #[test]
    fn test_sample_deterministic_for_seed() {
        let c = core("(FPCore (x) (sqrt x))");
        let a = local_sample(&c, 50, 7).unwrap();
        let b = local_sample(&c, 50, 7).unwrap();
        assert_eq!(a.points, b.points);
        let other = local_sample(&c, 50, 8).unwrap();
        assert_ne!(a.points, other.points);
    }

    #[test]
    fn test_sample_respects_precondition() {
        let c = core("(FPCore (x) :pre (> x 0) (log x))");
        let s = local_sample(&c, 200, 3).unwrap();
        assert!(s.points.iter().all(|p| p[0] > 0.0));
        assert!(s.ground_truth.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_unsamplable_returns_none() {
        // no finite results anywhere on the domain
        let c = core("(FPCore (x) (/ 1 (- x x)))");
        assert!(local_sample(&c, 10, 1).is_none());
    }

    #[test]
    fn test_rejects_nonfinite_results() {
        let c = core("(FPCore (x) (exp x))");
        let s = local_sample(&c, 100, 5).unwrap();
        assert!(s.ground_truth.iter().all(|v| v.is_finite()));
    }
}
