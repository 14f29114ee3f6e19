//! Statistical anomaly detector
//!
//! Scores charging profiles against a configured baseline and accumulates
//! detection outcomes into a running confusion matrix. The detector only
//! sees the profile (and the caller-supplied ground truth for scoring);
//! it never learns whether the attack engine actually fired.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChargingProfile, ChargingRateUnit};
use crate::sink::MetricsSink;

use super::{
    BaselineStats, DetectionConfig, DetectionEvent, DetectionMethod, DetectionMetrics,
    DetectionResult,
};

/// Per-flag confidence scales of the statistical checks.
const MEAN_Z_SCORE_SCALE: f64 = 3.0;
const MAX_DEVIATION_SCALE: f64 = 50.0;
/// Violation scale of the range-based check.
const RANGE_VIOLATION_SCALE: f64 = 20.0;

pub struct AnomalyDetector {
    config: DetectionConfig,
    metrics: DetectionMetrics,
    sink: Arc<dyn MetricsSink>,
}

impl AnomalyDetector {
    pub fn new(config: DetectionConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            metrics: DetectionMetrics::new(),
            sink,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Accumulated confusion matrix over all `detect_anomaly` calls.
    pub fn metrics(&self) -> DetectionMetrics {
        self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Run the configured check over a profile and record the outcome.
    pub fn detect_anomaly(
        &mut self,
        profile: &ChargingProfile,
        ground_truth: bool,
    ) -> DetectionResult {
        if !self.config.enabled {
            return DetectionResult::clean(ground_truth);
        }

        let limits = profile.limits();
        let rate_unit = profile
            .schedule()
            .map(|s| s.charging_rate_unit)
            .unwrap_or(ChargingRateUnit::A);

        let (events, parameters_checked) = match self.config.method {
            DetectionMethod::Statistical => self.check_statistical(&limits, rate_unit),
            DetectionMethod::RangeBased => self.check_ranges(&limits),
            DetectionMethod::PatternBased => self.check_pattern(&limits),
        };

        let confidence_score = self.overall_confidence(&events);
        let is_anomalous = !events.is_empty() && confidence_score > 0.5;

        self.metrics.record(is_anomalous, ground_truth);
        for event in &events {
            self.sink.log_detection_event(event);
        }
        debug!(
            method = ?self.config.method,
            events = events.len(),
            confidence = confidence_score,
            anomalous = is_anomalous,
            "Profile scored"
        );

        DetectionResult {
            is_anomalous,
            confidence_score,
            events,
            parameters_checked,
            ground_truth,
        }
    }

    /// Weighted average of the flagged events' confidences, clipped to
    /// `[0, 1]`; `0.0` when nothing was flagged.
    fn overall_confidence(&self, events: &[DetectionEvent]) -> f64 {
        if events.is_empty() {
            return 0.0;
        }
        let mut weighted = 0.0;
        let mut total = 0.0;
        for event in events {
            let weight = match event.method {
                DetectionMethod::Statistical => self.config.confidence_weight_statistical,
                DetectionMethod::RangeBased => self.config.confidence_weight_range,
                DetectionMethod::PatternBased => self.config.confidence_weight_pattern,
            };
            weighted += weight * event.confidence;
            total += weight;
        }
        if total == 0.0 {
            return 0.0;
        }
        (weighted / total).clamp(0.0, 1.0)
    }

    /// The baseline the schedule's rate unit is compared against.
    fn baseline_for(&self, unit: ChargingRateUnit) -> BaselineStats {
        match unit {
            ChargingRateUnit::A => self.config.baseline_current,
            ChargingRateUnit::W => self.config.baseline_power,
        }
    }

    // ── Checks ─────────────────────────────────────────────

    /// Compare mean and max limit against the baseline.
    fn check_statistical(
        &self,
        limits: &[f64],
        unit: ChargingRateUnit,
    ) -> (Vec<DetectionEvent>, usize) {
        if limits.is_empty() {
            return (Vec::new(), 0);
        }
        let baseline = self.baseline_for(unit);
        if baseline.mean == 0.0 {
            return (Vec::new(), 0);
        }
        let threshold = self.config.current_deviation_threshold;

        let mean = limits.iter().sum::<f64>() / limits.len() as f64;
        let max = limits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut events = Vec::new();

        let mean_deviation = (mean - baseline.mean).abs() / baseline.mean * 100.0;
        if mean_deviation > threshold {
            let z_score = if baseline.std_dev > 0.0 {
                (mean - baseline.mean).abs() / baseline.std_dev
            } else {
                0.0
            };
            events.push(self.event(
                DetectionMethod::Statistical,
                "mean_limit",
                mean,
                baseline.mean,
                mean_deviation,
                (z_score / MEAN_Z_SCORE_SCALE).min(1.0),
            ));
        }

        let max_deviation = (max - baseline.mean).abs() / baseline.mean * 100.0;
        if max_deviation > threshold {
            events.push(self.event(
                DetectionMethod::Statistical,
                "max_limit",
                max,
                baseline.mean,
                max_deviation,
                (max_deviation / MAX_DEVIATION_SCALE).min(1.0),
            ));
        }

        (events, 2)
    }

    /// Flag every period limit outside the configured safe range.
    fn check_ranges(&self, limits: &[f64]) -> (Vec<DetectionEvent>, usize) {
        let (min, max) = self.config.current_range;
        let mut events = Vec::new();

        for (i, &limit) in limits.iter().enumerate() {
            let (bound, violation) = if limit > max {
                (max, limit - max)
            } else if limit < min {
                (min, min - limit)
            } else {
                continue;
            };
            let violation_percent = if bound != 0.0 {
                violation / bound.abs() * 100.0
            } else {
                100.0
            };
            events.push(self.event(
                DetectionMethod::RangeBased,
                &format!("limit[{i}]"),
                limit,
                bound,
                violation_percent,
                (violation_percent / RANGE_VIOLATION_SCALE).min(1.0),
            ));
        }

        (events, limits.len())
    }

    /// Irregularity of the limit curve: first-difference variance
    /// normalized by the squared mean limit.
    fn check_pattern(&self, limits: &[f64]) -> (Vec<DetectionEvent>, usize) {
        if limits.len() < 3 {
            return (Vec::new(), 0);
        }
        let mean = limits.iter().sum::<f64>() / limits.len() as f64;
        if mean == 0.0 {
            return (Vec::new(), 0);
        }

        let diffs: Vec<f64> = limits.windows(2).map(|w| w[1] - w[0]).collect();
        let diff_mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let variance =
            diffs.iter().map(|d| (d - diff_mean).powi(2)).sum::<f64>() / diffs.len() as f64;
        let irregularity = variance / mean.powi(2);

        let threshold = self.config.curve_smoothness_threshold;
        let mut events = Vec::new();
        if irregularity > threshold {
            events.push(self.event(
                DetectionMethod::PatternBased,
                "curve_irregularity",
                irregularity,
                threshold,
                if threshold != 0.0 {
                    (irregularity - threshold) / threshold * 100.0
                } else {
                    100.0
                },
                if threshold != 0.0 {
                    (irregularity / threshold).min(1.0)
                } else {
                    1.0
                },
            ));
        }

        (events, 1)
    }

    fn event(
        &self,
        method: DetectionMethod,
        parameter: &str,
        observed: f64,
        expected: f64,
        deviation_percent: f64,
        confidence: f64,
    ) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method,
            parameter: parameter.to_string(),
            observed,
            expected,
            deviation_percent,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sink::NullSink;

    fn profile_with_limits(unit: &str, limits: &[f64]) -> ChargingProfile {
        let periods: Vec<_> = limits
            .iter()
            .enumerate()
            .map(|(i, l)| json!({"startPeriod": (i as i64) * 1800, "limit": l}))
            .collect();
        serde_json::from_value(json!({
            "chargingProfileId": 1,
            "chargingSchedule": {
                "chargingRateUnit": unit,
                "chargingSchedulePeriod": periods
            }
        }))
        .unwrap()
    }

    fn detector(config: DetectionConfig) -> AnomalyDetector {
        AnomalyDetector::new(config, Arc::new(NullSink))
    }

    #[test]
    fn statistical_flags_large_mean_deviation() {
        // baseline mean 30, std 5, threshold 15% — mean 45 is 50% above
        let mut d = detector(DetectionConfig::default());
        let result = d.detect_anomaly(&profile_with_limits("A", &[45.0, 45.0]), true);
        assert!(result.is_anomalous);
        assert!(result.confidence_score > 0.5);
        assert_eq!(result.parameters_checked, 2);
    }

    #[test]
    fn statistical_passes_small_mean_deviation() {
        let mut d = detector(DetectionConfig::default());
        let result = d.detect_anomaly(&profile_with_limits("A", &[31.0, 31.0]), false);
        assert!(!result.is_anomalous);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.events.is_empty());
    }

    #[test]
    fn confidence_of_exactly_half_is_not_anomalous() {
        // mean 37.5: z = 1.5 → confidence 0.5; max deviation 25% → 0.5.
        // Weighted average is exactly 0.5 and the comparison is strict.
        let mut d = detector(DetectionConfig::default());
        let result = d.detect_anomaly(&profile_with_limits("A", &[37.5, 37.5]), true);
        assert_eq!(result.events.len(), 2);
        assert!((result.confidence_score - 0.5).abs() < 1e-12);
        assert!(!result.is_anomalous);
    }

    #[test]
    fn watt_schedules_use_the_power_baseline() {
        let mut d = detector(DetectionConfig::default());
        let ok = d.detect_anomaly(&profile_with_limits("W", &[7000.0, 7100.0]), false);
        assert!(!ok.is_anomalous);
        let bad = d.detect_anomaly(&profile_with_limits("W", &[14000.0, 14000.0]), true);
        assert!(bad.is_anomalous);
    }

    #[test]
    fn range_check_flags_out_of_range_periods() {
        let config = DetectionConfig {
            method: DetectionMethod::RangeBased,
            current_range: (0.0, 32.0),
            ..Default::default()
        };
        let mut d = detector(config);
        let result = d.detect_anomaly(&profile_with_limits("A", &[16.0, 40.0, 30.0]), true);
        assert!(result.is_anomalous);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].parameter, "limit[1]");
        assert_eq!(result.parameters_checked, 3);
        // (40 - 32) / 32 = 25% violation, capped confidence
        assert!((result.events[0].confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn range_check_passes_in_range_profile() {
        let config = DetectionConfig {
            method: DetectionMethod::RangeBased,
            ..Default::default()
        };
        let mut d = detector(config);
        let result = d.detect_anomaly(&profile_with_limits("A", &[6.0, 16.0, 32.0]), false);
        assert!(!result.is_anomalous);
        assert!(result.events.is_empty());
    }

    #[test]
    fn pattern_check_flags_jagged_curves() {
        let config = DetectionConfig {
            method: DetectionMethod::PatternBased,
            ..Default::default()
        };
        let mut d = detector(config);
        let smooth = d.detect_anomaly(&profile_with_limits("A", &[30.0, 29.0, 28.0, 27.0]), false);
        assert!(!smooth.is_anomalous);
        let jagged = d.detect_anomaly(&profile_with_limits("A", &[10.0, 40.0, 5.0, 35.0]), true);
        assert!(jagged.is_anomalous);
        assert_eq!(jagged.events[0].parameter, "curve_irregularity");
    }

    #[test]
    fn pattern_check_needs_three_periods() {
        let config = DetectionConfig {
            method: DetectionMethod::PatternBased,
            ..Default::default()
        };
        let mut d = detector(config);
        let result = d.detect_anomaly(&profile_with_limits("A", &[10.0, 40.0]), false);
        assert!(!result.is_anomalous);
        assert_eq!(result.parameters_checked, 0);
    }

    #[test]
    fn disabled_detector_returns_clean_and_records_nothing() {
        let config = DetectionConfig {
            enabled: false,
            ..Default::default()
        };
        let mut d = detector(config);
        let result = d.detect_anomaly(&profile_with_limits("A", &[500.0]), true);
        assert!(!result.is_anomalous);
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.parameters_checked, 0);
        assert_eq!(d.metrics().total(), 0);
    }

    /// The offline research pipeline end to end: manipulate profiles,
    /// convert them into charging stress, score them, and evaluate how
    /// separable attack and baseline are.
    #[test]
    fn attack_cycles_degrade_faster_and_score_higher() {
        use crate::attack::{AttackConfig, AttackEngine};
        use crate::battery::{BatteryDegradationModel, ChargingCycleParams, DegradationParameters};
        use crate::detection::calculate_roc_curve;
        use crate::sink::{MetricsSink, TracingSink};

        let sink = Arc::new(TracingSink);
        let engine = AttackEngine::new(
            AttackConfig {
                voltage_enabled: true,
                voltage_deviation_percent: 50.0,
                current_enabled: false,
                curve_enabled: false,
                ..Default::default()
            },
            sink.clone(),
        );
        let mut detector = AnomalyDetector::new(DetectionConfig::default(), sink.clone());

        // 60 Ah puts the 30 A baseline limit exactly at the optimal 0.5 C
        let mut attacked_battery =
            BatteryDegradationModel::new(DegradationParameters::default(), 60.0);
        let mut baseline_battery =
            BatteryDegradationModel::new(DegradationParameters::default(), 60.0);

        let baseline = profile_with_limits("A", &[30.0, 30.0]);
        let mut predictions = Vec::new();

        for _ in 0..20 {
            let attacked = engine.manipulate_charging_profile(&baseline).unwrap();

            for (profile, truth, battery) in [
                (&attacked, true, &mut attacked_battery),
                (&baseline, false, &mut baseline_battery),
            ] {
                // limit in amperes, C-rate against the rated capacity
                let c_rate = profile.limits()[0] / 60.0;
                let result = battery.simulate_charging_cycle(
                    &ChargingCycleParams {
                        current: Some(c_rate),
                        ..Default::default()
                    },
                    1.0,
                );
                sink.log_degradation_event(&result, result.cycle);

                let verdict = detector.detect_anomaly(profile, truth);
                predictions.push((verdict.confidence_score, truth));
            }
        }

        // manipulated charging stresses the battery measurably harder
        assert!(attacked_battery.soh() < baseline_battery.soh());

        // and the 50% deviation is trivially separable
        let curve = calculate_roc_curve(&predictions);
        assert!(curve.auc > 0.9, "auc = {}", curve.auc);
        let metrics = detector.metrics();
        assert_eq!(metrics.true_positives, 20);
        assert_eq!(metrics.true_negatives, 20);
    }

    #[test]
    fn outcomes_accumulate_into_the_confusion_matrix() {
        let mut d = detector(DetectionConfig::default());
        d.detect_anomaly(&profile_with_limits("A", &[45.0]), true); // TP
        d.detect_anomaly(&profile_with_limits("A", &[30.0]), false); // TN
        d.detect_anomaly(&profile_with_limits("A", &[30.0]), true); // FN
        d.detect_anomaly(&profile_with_limits("A", &[45.0]), false); // FP

        let m = d.metrics();
        assert_eq!(m.true_positives, 1);
        assert_eq!(m.true_negatives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.false_positives, 1);

        d.reset_metrics();
        assert_eq!(d.metrics().total(), 0);
    }
}
