//! Detection performance evaluation
//!
//! Turns accumulated `(confidence, ground_truth)` pairs into an ROC curve
//! with trapezoidal AUC, and composes the final performance report from a
//! confusion matrix plus the curve. Plotting is a collaborator's concern.

use serde::Serialize;

use super::DetectionMetrics;

/// One point of the ROC curve.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Ordered ROC points plus the area under the curve.
#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

impl RocCurve {
    fn empty() -> Self {
        Self {
            points: Vec::new(),
            auc: 0.0,
        }
    }
}

/// Compute the ROC curve over `(confidence, ground_truth)` predictions.
///
/// Requires at least one positive and one negative sample; otherwise the
/// curve is empty with `auc = 0`. Ties at the same confidence merge into
/// one point.
pub fn calculate_roc_curve(predictions: &[(f64, bool)]) -> RocCurve {
    let positives = predictions.iter().filter(|(_, truth)| *truth).count();
    let negatives = predictions.len() - positives;
    if positives == 0 || negatives == 0 {
        return RocCurve::empty();
    }

    let mut sorted: Vec<(f64, bool)> = predictions.to_vec();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut points = vec![RocPoint {
        threshold: 1.0,
        true_positive_rate: 0.0,
        false_positive_rate: 0.0,
        precision: 0.0,
        recall: 0.0,
    }];

    let mut tp = 0u64;
    let mut fp = 0u64;
    let mut i = 0;
    while i < sorted.len() {
        let score = sorted[i].0;
        // consume the whole tie group before emitting a point
        while i < sorted.len() && sorted[i].0 == score {
            if sorted[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(roc_point(score, tp, fp, positives as u64, negatives as u64));
    }

    let last = points[points.len() - 1];
    if last.true_positive_rate != 1.0 || last.false_positive_rate != 1.0 {
        points.push(roc_point(
            0.0,
            positives as u64,
            negatives as u64,
            positives as u64,
            negatives as u64,
        ));
    }

    let auc = trapezoidal_auc(&points);
    RocCurve { points, auc }
}

fn roc_point(threshold: f64, tp: u64, fp: u64, positives: u64, negatives: u64) -> RocPoint {
    let tpr = tp as f64 / positives as f64;
    let fpr = fp as f64 / negatives as f64;
    let precision = if tp + fp == 0 {
        0.0
    } else {
        tp as f64 / (tp + fp) as f64
    };
    RocPoint {
        threshold,
        true_positive_rate: tpr,
        false_positive_rate: fpr,
        precision,
        recall: tpr,
    }
}

/// Trapezoidal integral of TPR over FPR across the ordered points.
fn trapezoidal_auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            (w[1].false_positive_rate - w[0].false_positive_rate)
                * (w[0].true_positive_rate + w[1].true_positive_rate)
                / 2.0
        })
        .sum()
}

/// Final numbers of one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub samples: u64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub false_positive_rate: f64,
    pub auc: f64,
    pub roc_points: Vec<RocPoint>,
}

/// Compose the report from accumulated metrics and an ROC curve.
pub fn generate_performance_report(
    metrics: &DetectionMetrics,
    curve: &RocCurve,
) -> PerformanceReport {
    PerformanceReport {
        samples: metrics.total(),
        accuracy: metrics.accuracy(),
        precision: metrics.precision(),
        recall: metrics.recall(),
        f1_score: metrics.f1_score(),
        false_positive_rate: metrics.false_positive_rate(),
        auc: curve.auc,
        roc_points: curve.points.clone(),
    }
}
