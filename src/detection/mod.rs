//! Anomaly detection for manipulated charging profiles

pub mod detector;
pub mod evaluator;
pub mod metrics;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

pub use detector::AnomalyDetector;
pub use evaluator::{calculate_roc_curve, generate_performance_report, PerformanceReport, RocCurve, RocPoint};
pub use metrics::DetectionMetrics;

/// Detection method selecting which check runs on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    /// Baseline z-score / percent-deviation checks on mean and max limit.
    Statistical,
    /// Absolute safe-range check on every period limit.
    RangeBased,
    /// First-difference irregularity check on the limit curve.
    PatternBased,
}

impl DetectionMethod {
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "statistical" => Self::Statistical,
            "range_based" | "range" => Self::RangeBased,
            "pattern_based" | "pattern" => Self::PatternBased,
            other => {
                warn!(method = other, "Unknown detection method, falling back to statistical");
                Self::Statistical
            }
        }
    }
}

/// Baseline mean/std pair for one observed parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub enabled: bool,
    pub method: DetectionMethod,

    /// Percent-deviation thresholds for the statistical checks.
    pub voltage_deviation_threshold: f64,
    pub current_deviation_threshold: f64,

    /// Absolute safe ranges for the range-based check.
    pub voltage_range: (f64, f64),
    pub current_range: (f64, f64),

    /// Irregularity threshold for the pattern-based check.
    pub curve_smoothness_threshold: f64,

    /// Per-method confidence weights for the overall score.
    pub confidence_weight_statistical: f64,
    pub confidence_weight_range: f64,
    pub confidence_weight_pattern: f64,

    /// Baselines for limits expressed in amperes, watts and for cell
    /// voltage respectively; the schedule's rate unit selects which one
    /// the statistical check compares against.
    pub baseline_current: BaselineStats,
    pub baseline_power: BaselineStats,
    pub baseline_voltage: BaselineStats,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: DetectionMethod::Statistical,
            voltage_deviation_threshold: 15.0,
            current_deviation_threshold: 15.0,
            voltage_range: (180.0, 250.0),
            current_range: (0.0, 32.0),
            curve_smoothness_threshold: 0.5,
            confidence_weight_statistical: 1.0,
            confidence_weight_range: 0.8,
            confidence_weight_pattern: 0.6,
            baseline_current: BaselineStats {
                mean: 30.0,
                std_dev: 5.0,
            },
            baseline_power: BaselineStats {
                mean: 7000.0,
                std_dev: 1200.0,
            },
            baseline_voltage: BaselineStats {
                mean: 230.0,
                std_dev: 10.0,
            },
        }
    }
}

/// One flagged observation.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: DetectionMethod,
    /// What was checked, e.g. `mean_limit`, `limit[3]`, `curve_irregularity`.
    pub parameter: String,
    pub observed: f64,
    pub expected: f64,
    pub deviation_percent: f64,
    pub confidence: f64,
}

/// Verdict for one profile.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub is_anomalous: bool,
    pub confidence_score: f64,
    pub events: Vec<DetectionEvent>,
    pub parameters_checked: usize,
    pub ground_truth: bool,
}

impl DetectionResult {
    /// Zero-confidence, non-anomalous result with nothing checked.
    pub fn clean(ground_truth: bool) -> Self {
        Self {
            is_anomalous: false,
            confidence_score: 0.0,
            events: Vec::new(),
            parameters_checked: 0,
            ground_truth,
        }
    }
}
