//! Charging-profile attack engine
//!
//! Configuration, strategy vocabulary and the manipulation event record.
//! The engine itself lives in [`engine`].

pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use engine::AttackEngine;

/// How aggressively the configured deviations are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackStrategy {
    /// Full configured deviation.
    Aggressive,
    /// One fifth of the configured deviation; curve manipulation is never
    /// applied to reduce detectability.
    Subtle,
    /// Per-period uniform deviation draw, plus per-type application gating.
    Random,
    /// Reserved for per-parameter targeting; currently behaves like
    /// `Aggressive`.
    Targeted,
}

impl AttackStrategy {
    /// Parse a configuration string, falling back to `Aggressive` with a
    /// logged warning on anything unrecognized. Invalid strategy values are
    /// a configuration-construction concern, never a manipulation-time one.
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "aggressive" => Self::Aggressive,
            "subtle" => Self::Subtle,
            "random" => Self::Random,
            "targeted" => Self::Targeted,
            other => {
                warn!(strategy = other, "Unknown attack strategy, falling back to aggressive");
                Self::Aggressive
            }
        }
    }
}

/// Shape applied to the limit curve across periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveMode {
    /// Every limit becomes the maximum observed limit.
    Flatten,
    /// Limits scale up by period position, `1 + (i/n) * 0.5`.
    Steepen,
    /// The limit sequence is reversed positionally; start offsets stay.
    Invert,
}

impl CurveMode {
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "flatten" => Self::Flatten,
            "steepen" => Self::Steepen,
            "invert" => Self::Invert,
            other => {
                warn!(mode = other, "Unknown curve modification type, falling back to flatten");
                Self::Flatten
            }
        }
    }
}

/// Immutable attack configuration.
///
/// The target ranges are advisory metadata only: manipulation is
/// percentage-based and deliberately unclamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    pub enabled: bool,
    pub strategy: AttackStrategy,

    pub voltage_enabled: bool,
    pub voltage_deviation_percent: f64,
    pub voltage_target_range: (f64, f64),

    pub current_enabled: bool,
    pub current_deviation_percent: f64,
    pub current_target_range: (f64, f64),

    pub curve_enabled: bool,
    pub curve_mode: CurveMode,

    pub randomization_enabled: bool,
    pub randomization_seed: Option<u64>,
    pub randomization_deviation_range: (f64, f64),
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: AttackStrategy::Aggressive,
            voltage_enabled: true,
            voltage_deviation_percent: 10.0,
            voltage_target_range: (3.0, 4.2),
            current_enabled: true,
            current_deviation_percent: 10.0,
            current_target_range: (6.0, 32.0),
            curve_enabled: false,
            curve_mode: CurveMode::Flatten,
            randomization_enabled: false,
            randomization_seed: None,
            randomization_deviation_range: (5.0, 25.0),
        }
    }
}

/// One rewritten period limit, diffed after a successful manipulation.
#[derive(Debug, Clone, Serialize)]
pub struct ManipulationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub strategy: AttackStrategy,
    pub period_index: usize,
    pub start_period: i64,
    pub original_limit: f64,
    pub modified_limit: f64,
    pub deviation_percent: f64,
}

/// Manipulation failures.
///
/// Manipulation is all-or-nothing: on error the caller keeps the original
/// profile and the relay forwards the frame unchanged.
#[derive(Debug, Error)]
pub enum AttackError {
    #[error("Manipulation produced a non-finite limit in period {0}")]
    NonFiniteLimit(usize),
}
