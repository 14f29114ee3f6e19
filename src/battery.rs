//! Battery degradation model
//!
//! A simplified multiplicative stress model: each simulated charging cycle
//! converts the (possibly manipulated) charging parameters into a state-of-
//! health delta. Intended for comparative attack-vs-baseline measurement,
//! not absolute chemistry prediction.

use serde::{Deserialize, Serialize};

/// Stress coefficients and optima, fixed per model instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationParameters {
    /// Optimal cell voltage (V).
    pub optimal_voltage: f64,
    /// Optimal charging C-rate (multiples of rated capacity).
    pub optimal_c_rate: f64,
    /// Optimal state-of-charge window floor (%).
    pub optimal_soc_min: f64,
    /// Optimal state-of-charge window ceiling (%).
    pub optimal_soc_max: f64,
    /// Exponential voltage stress coefficient.
    pub voltage_stress_coefficient: f64,
    /// Quadratic C-rate stress coefficient.
    pub current_stress_coefficient: f64,
    /// Linear SoC-excursion stress coefficient.
    pub soc_stress_coefficient: f64,
    /// Degradation (% SoH) per cycle-hour at unit stress.
    pub base_degradation_per_cycle: f64,
}

impl Default for DegradationParameters {
    fn default() -> Self {
        Self {
            optimal_voltage: 3.7,
            optimal_c_rate: 0.5,
            optimal_soc_min: 20.0,
            optimal_soc_max: 80.0,
            voltage_stress_coefficient: 0.5,
            current_stress_coefficient: 0.3,
            soc_stress_coefficient: 0.2,
            base_degradation_per_cycle: 0.001,
        }
    }
}

/// Charging parameters of one cycle. Missing fields default to the
/// model's configured optimum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargingCycleParams {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub soc_min: Option<f64>,
    pub soc_max: Option<f64>,
    pub temperature: Option<f64>,
}

/// Outcome of one simulated cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DegradationResult {
    pub cycle: u64,
    pub soh_before: f64,
    pub soh_after: f64,
    pub degradation_percent: f64,
    pub voltage_stress: f64,
    pub current_stress: f64,
    pub soc_stress: f64,
    pub temperature_stress: f64,
}

/// State-of-health model for one simulated battery.
///
/// `soh` starts at 100.0 and is floored at 0. There is deliberately no
/// upper clamp at 100: no code path produces negative degradation today,
/// but a hypothetical negative-degradation call would push `soh` above 100.
#[derive(Debug, Clone)]
pub struct BatteryDegradationModel {
    params: DegradationParameters,
    capacity_ah: f64,
    soh: f64,
    cycle_count: u64,
}

impl BatteryDegradationModel {
    pub fn new(params: DegradationParameters, capacity_ah: f64) -> Self {
        Self {
            params,
            capacity_ah,
            soh: 100.0,
            cycle_count: 0,
        }
    }

    pub fn soh(&self) -> f64 {
        self.soh
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn params(&self) -> &DegradationParameters {
        &self.params
    }

    /// Remaining usable capacity at the current state of health.
    pub fn remaining_capacity(&self) -> f64 {
        self.capacity_ah * self.soh / 100.0
    }

    /// Restore the factory state.
    pub fn reset(&mut self) {
        self.soh = 100.0;
        self.cycle_count = 0;
    }

    /// Simulate one charging cycle and apply its degradation.
    pub fn simulate_charging_cycle(
        &mut self,
        cycle: &ChargingCycleParams,
        duration_hours: f64,
    ) -> DegradationResult {
        let p = &self.params;
        let voltage = cycle.voltage.unwrap_or(p.optimal_voltage);
        let current = cycle.current.unwrap_or(p.optimal_c_rate);
        let soc_min = cycle.soc_min.unwrap_or(p.optimal_soc_min);
        let soc_max = cycle.soc_max.unwrap_or(p.optimal_soc_max);

        // Symmetric exponential penalty for over- or under-voltage.
        let voltage_stress =
            (p.voltage_stress_coefficient * (voltage - p.optimal_voltage).abs()).exp();

        // Quadratic penalty for any C-rate deviation.
        let current_stress =
            1.0 + p.current_stress_coefficient * (current - p.optimal_c_rate).powi(2);

        // Linear penalty for excursions outside the optimal SoC window.
        let excursion =
            (p.optimal_soc_min - soc_min).max(0.0) + (soc_max - p.optimal_soc_max).max(0.0);
        let soc_stress = 1.0 + p.soc_stress_coefficient * excursion / 100.0;

        // Reserved extension point; always neutral.
        let temperature_stress = 1.0;

        let combined = voltage_stress * current_stress * soc_stress * temperature_stress;
        let degradation_percent = p.base_degradation_per_cycle * combined * duration_hours;

        let soh_before = self.soh;
        self.soh = (self.soh - degradation_percent).max(0.0);
        self.cycle_count += 1;

        DegradationResult {
            cycle: self.cycle_count,
            soh_before,
            soh_after: self.soh,
            degradation_percent,
            voltage_stress,
            current_stress,
            soc_stress,
            temperature_stress,
        }
    }
}
