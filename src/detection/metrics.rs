//! Detection outcome accumulation
//!
//! A running confusion matrix keyed by `(predicted, ground_truth)`.
//! Every derived rate evaluates to `0.0` when its denominator is zero.

use serde::Serialize;

/// Confusion-matrix counters with derived rates.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DetectionMetrics {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one detection outcome.
    pub fn record(&mut self, predicted_anomaly: bool, ground_truth: bool) {
        match (predicted_anomaly, ground_truth) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(
            self.true_positives + self.true_negatives,
            self.total(),
        )
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
