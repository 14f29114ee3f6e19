//! Core domain types shared by the relay, attack engine and analysis side

pub mod frame;
pub mod profile;
pub mod version;

pub use frame::{FrameError, OcppFrame};
pub use profile::{
    ChargingProfile, ChargingRateUnit, ChargingSchedule, ChargingSchedulePeriod, ScheduleSlot,
};
pub use version::OcppVersion;
