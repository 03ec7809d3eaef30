//! Non-dominated (cost, error) frontiers, lower-is-better on both axes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub cost: f64,
    pub error: f64,
    /// Key of the kernel this point belongs to.
    pub key: String,
}

pub type ParetoFrontier = Vec<ParetoPoint>;

/// Sweep candidates by cost ascending, keeping a point only when its
/// error strictly improves on the best seen so far. Ties in cost resolve
/// to the lower-error point. The result is the non-dominated frontier in
/// cost order, independent of input order beyond the (cost, error)
/// values themselves.
pub fn pareto_frontier(mut points: Vec<ParetoPoint>) -> ParetoFrontier {
    points.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then(a.error.total_cmp(&b.error))
            .then(a.key.cmp(&b.key))
    });
    let mut frontier: ParetoFrontier = Vec::new();
    let mut best_error = f64::INFINITY;
    for point in points {
        if point.error < best_error {
            best_error = point.error;
            frontier.push(point);
        }
    }
    frontier
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(cost: f64, error: f64) -> ParetoPoint {
        ParetoPoint {
            cost,
            error,
            key: format!("{}x{}", cost, error),
        }
    }

    #[test]
    fn test_reference_frontier() {
        let points = vec![pt(10.0, 0.1), pt(5.0, 0.2), pt(5.0, 0.05), pt(20.0, 0.01)];
        let frontier = pareto_frontier(points);
        let got: Vec<(f64, f64)> = frontier.iter().map(|p| (p.cost, p.error)).collect();
        assert_eq!(got, vec![(5.0, 0.05), (20.0, 0.01)]);
    }

    #[test]
    fn test_no_point_dominates_another() {
        let points = vec![
            pt(1.0, 9.0),
            pt(2.0, 7.0),
            pt(2.5, 8.0),
            pt(3.0, 3.0),
            pt(4.0, 3.0),
            pt(9.0, 1.0),
        ];
        let frontier = pareto_frontier(points);
        for p in &frontier {
            for q in &frontier {
                let dominates = p.cost <= q.cost
                    && p.error <= q.error
                    && (p.cost < q.cost || p.error < q.error);
                assert!(!dominates || p.key == q.key, "{:?} dominates {:?}", p, q);
            }
        }
    }

    #[test]
    fn test_errors_strictly_decrease_in_cost_order() {
        let points = vec![pt(3.0, 0.5), pt(1.0, 2.0), pt(2.0, 1.0), pt(4.0, 0.5)];
        let frontier = pareto_frontier(points);
        for pair in frontier.windows(2) {
            assert!(pair[0].cost <= pair[1].cost);
            assert!(pair[0].error > pair[1].error);
        }
    }

    #[test]
    fn test_permutation_independent() {
        let mut points = vec![pt(10.0, 0.1), pt(5.0, 0.2), pt(5.0, 0.05), pt(20.0, 0.01)];
        let expected = pareto_frontier(points.clone());
        points.reverse();
        assert_eq!(pareto_frontier(points), expected);
    }

    #[test]
    fn test_empty_in_empty_out() {
        assert!(pareto_frontier(Vec::new()).is_empty());
        assert_eq!(pareto_frontier(vec![pt(1.0, 1.0)]).len(), 1);
    }
}
