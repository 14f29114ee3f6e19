//! Charging-profile data model
//!
//! One logical model for the charging schedule across all OCPP versions.
//! OCPP 1.6 nests a single schedule object under the profile; OCPP 2.0 and
//! 2.0.1 nest an ordered array of schedules, of which only the first is
//! consumed here. Unknown/vendor fields are captured in `extra` maps so a
//! rewritten profile serializes back with everything the sender included.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Charging-rate unit of a schedule: amperes or watts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingRateUnit {
    A,
    W,
}

/// One period of a charging schedule.
///
/// `limit` is a non-negative charging-rate ceiling in the schedule's unit;
/// periods are ordered by `start_period` (seconds from schedule start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedulePeriod {
    pub start_period: i64,
    pub limit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A charging schedule: rate unit plus an ordered period sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedule {
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChargingSchedule {
    /// The period limits, in schedule order.
    pub fn limits(&self) -> Vec<f64> {
        self.charging_schedule_period.iter().map(|p| p.limit).collect()
    }
}

/// The version-dependent `chargingSchedule` field: a single object in
/// OCPP 1.6, an ordered array in OCPP 2.0/2.0.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleSlot {
    Single(Box<ChargingSchedule>),
    Many(Vec<ChargingSchedule>),
}

/// A charging profile envelope.
///
/// Only the schedule is modeled; the remaining profile fields (id, stack
/// level, purpose, kind, validity window) ride along untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_schedule: Option<ScheduleSlot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChargingProfile {
    /// The effective schedule: the single 1.6 schedule, or the first
    /// element of the 2.0/2.0.1 schedule array. `None` when the profile
    /// carries no schedule.
    pub fn schedule(&self) -> Option<&ChargingSchedule> {
        match self.charging_schedule.as_ref()? {
            ScheduleSlot::Single(s) => Some(s),
            ScheduleSlot::Many(v) => v.first(),
        }
    }

    /// Mutable access to the effective schedule.
    pub fn schedule_mut(&mut self) -> Option<&mut ChargingSchedule> {
        match self.charging_schedule.as_mut()? {
            ScheduleSlot::Single(s) => Some(s),
            ScheduleSlot::Many(v) => v.first_mut(),
        }
    }

    /// The effective schedule's period limits, or empty if absent.
    pub fn limits(&self) -> Vec<f64> {
        self.schedule().map(|s| s.limits()).unwrap_or_default()
    }
}
