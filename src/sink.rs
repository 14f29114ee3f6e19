//! Metrics/persistence sink
//!
//! The core reports manipulations, detection events and degradation results
//! to an injected sink; how the sink stores them is the collaborator's
//! concern. [`TracingSink`] emits structured log lines and is the default
//! for the relay binary; [`NullSink`] discards everything (tests).

use tracing::info;

use crate::attack::ManipulationEvent;
use crate::battery::DegradationResult;
use crate::detection::DetectionEvent;

/// Sink for the three event shapes the core produces.
pub trait MetricsSink: Send + Sync {
    fn log_manipulation(&self, event: &ManipulationEvent);
    fn log_detection_event(&self, event: &DetectionEvent);
    fn log_degradation_event(&self, result: &DegradationResult, cycle: u64);
}

/// Sink that forwards every event to the `tracing` pipeline.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log_manipulation(&self, event: &ManipulationEvent) {
        info!(
            id = %event.id,
            period = event.period_index,
            original = event.original_limit,
            modified = event.modified_limit,
            deviation_percent = event.deviation_percent,
            strategy = ?event.strategy,
            "Charging limit manipulated"
        );
    }

    fn log_detection_event(&self, event: &DetectionEvent) {
        info!(
            id = %event.id,
            method = ?event.method,
            parameter = %event.parameter,
            observed = event.observed,
            expected = event.expected,
            confidence = event.confidence,
            "Anomaly flagged"
        );
    }

    fn log_degradation_event(&self, result: &DegradationResult, cycle: u64) {
        info!(
            cycle,
            soh_before = result.soh_before,
            soh_after = result.soh_after,
            degradation_percent = result.degradation_percent,
            "Charging cycle simulated"
        );
    }
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn log_manipulation(&self, _event: &ManipulationEvent) {}
    fn log_detection_event(&self, _event: &DetectionEvent) {}
    fn log_degradation_event(&self, _result: &DegradationResult, _cycle: u64) {}
}
