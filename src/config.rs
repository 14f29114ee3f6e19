//! Configuration module
//!
//! TOML application configuration for the relay binary. The core
//! components consume the already-validated structured configs built by
//! the `to_*` conversions here; string-valued enum fields parse with a
//! warn-and-fallback at construction time, never at manipulation time.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::attack::{AttackConfig, AttackStrategy, CurveMode};
use crate::battery::DegradationParameters;
use crate::detection::{BaselineStats, DetectionConfig, DetectionMethod};
use crate::relay::RelayConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Full application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub relay: RelaySettings,
    pub attack: AttackSettings,
    pub detection: DetectionSettings,
    pub battery: BatterySettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Default location: `~/.config/ocpp-mitm-lab/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-mitm-lab")
        .join("config.toml")
}

// ── [relay] ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub listen_host: String,
    pub listen_port: u16,
    pub target_host: String,
    pub target_port: u16,
}

impl Default for RelaySettings {
    fn default() -> Self {
        let c = RelayConfig::default();
        Self {
            listen_host: c.listen_host,
            listen_port: c.listen_port,
            target_host: c.target_host,
            target_port: c.target_port,
        }
    }
}

impl RelaySettings {
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            target_host: self.target_host.clone(),
            target_port: self.target_port,
        }
    }
}

// ── [attack] ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttackSettings {
    pub enabled: bool,
    pub strategy: String,
    pub voltage_enabled: bool,
    pub voltage_deviation_percent: f64,
    pub voltage_target_range: (f64, f64),
    pub current_enabled: bool,
    pub current_deviation_percent: f64,
    pub current_target_range: (f64, f64),
    pub curve_enabled: bool,
    pub curve_modification_type: String,
    pub randomization_enabled: bool,
    pub randomization_seed: Option<u64>,
    pub randomization_deviation_range: (f64, f64),
}

impl Default for AttackSettings {
    fn default() -> Self {
        let c = AttackConfig::default();
        Self {
            enabled: c.enabled,
            strategy: "aggressive".to_string(),
            voltage_enabled: c.voltage_enabled,
            voltage_deviation_percent: c.voltage_deviation_percent,
            voltage_target_range: c.voltage_target_range,
            current_enabled: c.current_enabled,
            current_deviation_percent: c.current_deviation_percent,
            current_target_range: c.current_target_range,
            curve_enabled: c.curve_enabled,
            curve_modification_type: "flatten".to_string(),
            randomization_enabled: c.randomization_enabled,
            randomization_seed: c.randomization_seed,
            randomization_deviation_range: c.randomization_deviation_range,
        }
    }
}

impl AttackSettings {
    pub fn to_attack_config(&self) -> AttackConfig {
        AttackConfig {
            enabled: self.enabled,
            strategy: AttackStrategy::parse_lossy(&self.strategy),
            voltage_enabled: self.voltage_enabled,
            voltage_deviation_percent: self.voltage_deviation_percent,
            voltage_target_range: self.voltage_target_range,
            current_enabled: self.current_enabled,
            current_deviation_percent: self.current_deviation_percent,
            current_target_range: self.current_target_range,
            curve_enabled: self.curve_enabled,
            curve_mode: CurveMode::parse_lossy(&self.curve_modification_type),
            randomization_enabled: self.randomization_enabled,
            randomization_seed: self.randomization_seed,
            randomization_deviation_range: self.randomization_deviation_range,
        }
    }
}

// ── [detection] ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub enabled: bool,
    pub method: String,
    pub voltage_deviation_threshold: f64,
    pub current_deviation_threshold: f64,
    pub voltage_range: (f64, f64),
    pub current_range: (f64, f64),
    pub curve_smoothness_threshold: f64,
    pub confidence_weight_statistical: f64,
    pub confidence_weight_range: f64,
    pub confidence_weight_pattern: f64,
    pub baseline_current: BaselineStats,
    pub baseline_power: BaselineStats,
    pub baseline_voltage: BaselineStats,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        let c = DetectionConfig::default();
        Self {
            enabled: c.enabled,
            method: "statistical".to_string(),
            voltage_deviation_threshold: c.voltage_deviation_threshold,
            current_deviation_threshold: c.current_deviation_threshold,
            voltage_range: c.voltage_range,
            current_range: c.current_range,
            curve_smoothness_threshold: c.curve_smoothness_threshold,
            confidence_weight_statistical: c.confidence_weight_statistical,
            confidence_weight_range: c.confidence_weight_range,
            confidence_weight_pattern: c.confidence_weight_pattern,
            baseline_current: c.baseline_current,
            baseline_power: c.baseline_power,
            baseline_voltage: c.baseline_voltage,
        }
    }
}

impl DetectionSettings {
    pub fn to_detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            enabled: self.enabled,
            method: DetectionMethod::parse_lossy(&self.method),
            voltage_deviation_threshold: self.voltage_deviation_threshold,
            current_deviation_threshold: self.current_deviation_threshold,
            voltage_range: self.voltage_range,
            current_range: self.current_range,
            curve_smoothness_threshold: self.curve_smoothness_threshold,
            confidence_weight_statistical: self.confidence_weight_statistical,
            confidence_weight_range: self.confidence_weight_range,
            confidence_weight_pattern: self.confidence_weight_pattern,
            baseline_current: self.baseline_current,
            baseline_power: self.baseline_power,
            baseline_voltage: self.baseline_voltage,
        }
    }
}

// ── [battery] ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatterySettings {
    pub capacity_ah: f64,
    pub optimal_voltage: f64,
    pub optimal_c_rate: f64,
    pub optimal_soc_min: f64,
    pub optimal_soc_max: f64,
    pub voltage_stress_coefficient: f64,
    pub current_stress_coefficient: f64,
    pub soc_stress_coefficient: f64,
    pub base_degradation_per_cycle: f64,
}

impl Default for BatterySettings {
    fn default() -> Self {
        let p = DegradationParameters::default();
        Self {
            capacity_ah: 75.0,
            optimal_voltage: p.optimal_voltage,
            optimal_c_rate: p.optimal_c_rate,
            optimal_soc_min: p.optimal_soc_min,
            optimal_soc_max: p.optimal_soc_max,
            voltage_stress_coefficient: p.voltage_stress_coefficient,
            current_stress_coefficient: p.current_stress_coefficient,
            soc_stress_coefficient: p.soc_stress_coefficient,
            base_degradation_per_cycle: p.base_degradation_per_cycle,
        }
    }
}

impl BatterySettings {
    pub fn to_degradation_parameters(&self) -> DegradationParameters {
        DegradationParameters {
            optimal_voltage: self.optimal_voltage,
            optimal_c_rate: self.optimal_c_rate,
            optimal_soc_min: self.optimal_soc_min,
            optimal_soc_max: self.optimal_soc_max,
            voltage_stress_coefficient: self.voltage_stress_coefficient,
            current_stress_coefficient: self.current_stress_coefficient,
            soc_stress_coefficient: self.soc_stress_coefficient,
            base_degradation_per_cycle: self.base_degradation_per_cycle,
        }
    }
}

// ── [logging] ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core_configs() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.relay.listen_port, 9000);
        assert_eq!(cfg.logging.level, "info");

        let attack = cfg.attack.to_attack_config();
        assert_eq!(attack.strategy, AttackStrategy::Aggressive);
        assert_eq!(attack.curve_mode, CurveMode::Flatten);

        let detection = cfg.detection.to_detection_config();
        assert_eq!(detection.method, DetectionMethod::Statistical);
        assert_eq!(detection.baseline_current.mean, 30.0);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [relay]
            listen_port = 8887
            target_host = "csms.internal"

            [attack]
            strategy = "subtle"
            voltage_deviation_percent = 7.5
            curve_enabled = true
            curve_modification_type = "invert"

            [detection]
            method = "pattern_based"

            [detection.baseline_current]
            mean = 24.0
            std_dev = 3.0
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.relay.listen_port, 8887);
        assert_eq!(cfg.relay.target_host, "csms.internal");
        // untouched section keeps defaults
        assert_eq!(cfg.battery.capacity_ah, 75.0);

        let attack = cfg.attack.to_attack_config();
        assert_eq!(attack.strategy, AttackStrategy::Subtle);
        assert_eq!(attack.voltage_deviation_percent, 7.5);
        assert_eq!(attack.curve_mode, CurveMode::Invert);

        let detection = cfg.detection.to_detection_config();
        assert_eq!(detection.method, DetectionMethod::PatternBased);
        assert_eq!(detection.baseline_current.mean, 24.0);
    }

    #[test]
    fn invalid_enum_strings_fall_back() {
        let raw = r#"
            [attack]
            strategy = "devastating"
            curve_modification_type = "zigzag"

            [detection]
            method = "clairvoyant"
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(
            cfg.attack.to_attack_config().strategy,
            AttackStrategy::Aggressive
        );
        assert_eq!(cfg.attack.to_attack_config().curve_mode, CurveMode::Flatten);
        assert_eq!(
            cfg.detection.to_detection_config().method,
            DetectionMethod::Statistical
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
