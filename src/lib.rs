//! # OCPP MITM Lab
//!
//! Research instrument for demonstrating and measuring a man-in-the-middle
//! integrity attack against OCPP charging-profile negotiation.
//!
//! ## Architecture
//!
//! - **domain**: OCPP-J framing, protocol versions and the charging-profile model
//! - **parser**: version-pinned profile extraction and reinsertion
//! - **attack**: the manipulation engine and its strategies
//! - **relay**: the live WebSocket interception proxy
//! - **battery**: state-of-health degradation model
//! - **detection**: anomaly detector, metrics and ROC/AUC evaluation
//! - **sink**: injected event sink for manipulation/detection/degradation records
//! - **config**: TOML application configuration

pub mod attack;
pub mod battery;
pub mod config;
pub mod detection;
pub mod domain;
pub mod parser;
pub mod relay;
pub mod sink;
pub mod support;

pub use attack::{AttackConfig, AttackEngine, AttackStrategy, CurveMode};
pub use battery::{BatteryDegradationModel, ChargingCycleParams, DegradationParameters};
pub use config::{default_config_path, AppConfig};
pub use detection::{AnomalyDetector, DetectionConfig, DetectionMetrics};
pub use domain::{ChargingProfile, OcppFrame, OcppVersion};
pub use parser::ProfileParser;
pub use relay::{MitmRelay, RelayConfig};
pub use sink::{MetricsSink, NullSink, TracingSink};
