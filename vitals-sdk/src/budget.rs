//! Performance budget scoring.
//!
//! Reduces a set of metrics to a 0-100 score. Each scored metric costs a
//! fixed number of points when it rates `NeedsImprovement`, and a larger
//! fixed number when it rates `Poor`.

use std::collections::HashMap;

use serde::Serialize;
use vitals_types::{EnhancedMetric, Rating, Threshold, CLS, FCP, FID, LCP};

/// `(metric, poor penalty, needs-improvement penalty)`
const PENALTIES: &[(&str, u32, u32)] = &[
    (LCP, 30, 15),
    (FID, 25, 10),
    (CLS, 25, 10),
    (FCP, 20, 10),
];

const MAX_SCORE: u32 = 100;

/// One deduction applied to the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Penalty {
    pub metric: &'static str,
    pub value: f64,
    pub rating: Rating,
    pub points: u32,
}

/// The score plus the deductions that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub score: u32,
    pub penalties: Vec<Penalty>,
}

impl BudgetReport {
    pub fn is_within_budget(&self) -> bool {
        self.penalties.is_empty()
    }
}

/// Evaluate metrics against the budget.
///
/// When a metric name appears more than once, the last occurrence is scored.
pub fn evaluate(metrics: &[EnhancedMetric]) -> BudgetReport {
    let latest: HashMap<&str, f64> = metrics.iter().map(|m| (m.name(), m.value())).collect();

    let mut penalties = Vec::new();
    for &(metric, poor_points, ni_points) in PENALTIES {
        let (Some(&value), Some(threshold)) = (latest.get(metric), Threshold::for_metric(metric))
        else {
            continue;
        };
        let rating = threshold.rate(value);
        let points = match rating {
            Rating::Good => continue,
            Rating::NeedsImprovement => ni_points,
            Rating::Poor => poor_points,
        };
        penalties.push(Penalty {
            metric,
            value,
            rating,
            points,
        });
    }

    let deducted: u32 = penalties.iter().map(|p| p.points).sum();
    BudgetReport {
        score: MAX_SCORE.saturating_sub(deducted),
        penalties,
    }
}

/// Score metrics against the budget, 0 to 100.
pub fn score(metrics: &[EnhancedMetric]) -> u32 {
    evaluate(metrics).score
}
