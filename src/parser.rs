//! OCPP charging-profile parser
//!
//! Hides the wire differences between OCPP versions behind the one logical
//! [`ChargingProfile`] model. A parser is pinned to the version negotiated
//! for its connection at construction; extraction and reinsertion use a
//! per-version key table rather than re-detecting anything per message.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::{ChargingProfile, ChargingSchedule, OcppVersion};

/// Actions that carry a charging profile, identical across all versions.
const SET_CHARGING_PROFILE_ACTIONS: &[&str] =
    &["SetChargingProfile", "SetChargingProfileRequest"];

/// Errors raised while extracting or reinserting a charging profile.
///
/// A *missing* profile key is not an error (`Ok(None)`); only a present but
/// undecodable profile is.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Charging profile is not decodable: {0}")]
    InvalidProfile(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    PayloadNotObject,
}

/// Version-pinned profile parser.
///
/// Pure with respect to its inputs; the only state is the version tag
/// fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ProfileParser {
    version: OcppVersion,
}

impl ProfileParser {
    pub fn new(version: OcppVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> OcppVersion {
        self.version
    }

    /// Detect the OCPP version from a negotiated subprotocol string.
    pub fn detect_version(subprotocol: &str) -> OcppVersion {
        OcppVersion::detect(subprotocol)
    }

    /// The payload key the profile is nested under for this version.
    fn profile_key(&self) -> &'static str {
        match self.version {
            OcppVersion::V16 | OcppVersion::Unknown => "csChargingProfiles",
            OcppVersion::V20 | OcppVersion::V201 => "chargingProfile",
        }
    }

    /// Extract the charging profile from a SetChargingProfile payload.
    ///
    /// Returns `Ok(None)` when the version-correct key is absent.
    pub fn parse_set_charging_profile(
        &self,
        payload: &Value,
    ) -> Result<Option<ChargingProfile>, ParseError> {
        let Some(raw) = payload.get(self.profile_key()) else {
            return Ok(None);
        };
        let profile: ChargingProfile = serde_json::from_value(raw.clone())?;
        Ok(Some(profile))
    }

    /// Reinsert a (possibly rewritten) profile at the version-correct key.
    pub fn reinsert_profile(
        &self,
        payload: &mut Value,
        profile: &ChargingProfile,
    ) -> Result<(), ParseError> {
        let obj = payload.as_object_mut().ok_or(ParseError::PayloadNotObject)?;
        let raw = serde_json::to_value(profile)?;
        obj.insert(self.profile_key().to_string(), raw);
        Ok(())
    }

    /// The effective schedule of a profile under this version's rules:
    /// the single 1.6 schedule, or the first of the 2.0/2.0.1 array.
    pub fn charging_schedule<'a>(
        &self,
        profile: &'a ChargingProfile,
    ) -> Option<&'a ChargingSchedule> {
        let schedule = profile.schedule();
        if schedule.is_none() {
            warn!(version = %self.version, "Profile carries no charging schedule");
        }
        schedule
    }

    /// True for exactly the SetChargingProfile action names; the name set
    /// is identical across all three versions.
    pub fn is_set_charging_profile_action(action: &str) -> bool {
        SET_CHARGING_PROFILE_ACTIONS.contains(&action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v16_payload() -> Value {
        json!({
            "connectorId": 1,
            "csChargingProfiles": {
                "chargingProfileId": 1,
                "stackLevel": 0,
                "chargingProfilePurpose": "TxProfile",
                "chargingProfileKind": "Absolute",
                "chargingSchedule": {
                    "chargingRateUnit": "A",
                    "chargingSchedulePeriod": [
                        {"startPeriod": 0, "limit": 32.0}
                    ]
                }
            }
        })
    }

    fn v201_payload() -> Value {
        json!({
            "evseId": 1,
            "chargingProfile": {
                "id": 7,
                "stackLevel": 1,
                "chargingProfilePurpose": "TxProfile",
                "chargingProfileKind": "Absolute",
                "chargingSchedule": [
                    {
                        "id": 1,
                        "chargingRateUnit": "W",
                        "chargingSchedulePeriod": [
                            {"startPeriod": 0, "limit": 11000.0}
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn extract_v16_profile() {
        let parser = ProfileParser::new(OcppVersion::V16);
        let profile = parser
            .parse_set_charging_profile(&v16_payload())
            .unwrap()
            .unwrap();
        let schedule = parser.charging_schedule(&profile).unwrap();
        assert_eq!(schedule.limits(), vec![32.0]);
    }

    #[test]
    fn extract_v201_profile() {
        let parser = ProfileParser::new(OcppVersion::V201);
        let profile = parser
            .parse_set_charging_profile(&v201_payload())
            .unwrap()
            .unwrap();
        let schedule = parser.charging_schedule(&profile).unwrap();
        assert_eq!(schedule.limits(), vec![11000.0]);
    }

    #[test]
    fn missing_key_is_not_an_error() {
        let parser = ProfileParser::new(OcppVersion::V16);
        // v2.0.1 payload seen through a 1.6 parser: key absent, empty result
        let result = parser.parse_set_charging_profile(&v201_payload()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn reinsert_at_version_correct_key() {
        let parser = ProfileParser::new(OcppVersion::V201);
        let mut payload = v201_payload();
        let mut profile = parser
            .parse_set_charging_profile(&payload)
            .unwrap()
            .unwrap();
        profile.schedule_mut().unwrap().charging_schedule_period[0].limit = 3700.0;
        parser.reinsert_profile(&mut payload, &profile).unwrap();

        assert_eq!(
            payload["chargingProfile"]["chargingSchedule"][0]["chargingSchedulePeriod"][0]
                ["limit"],
            3700.0
        );
        // envelope untouched
        assert_eq!(payload["evseId"], 1);
        assert_eq!(payload["chargingProfile"]["stackLevel"], 1);
    }

    #[test]
    fn reinsert_into_non_object_fails() {
        let parser = ProfileParser::new(OcppVersion::V16);
        let profile = parser
            .parse_set_charging_profile(&v16_payload())
            .unwrap()
            .unwrap();
        let mut payload = json!([1, 2, 3]);
        assert!(parser.reinsert_profile(&mut payload, &profile).is_err());
    }

    #[test]
    fn action_name_set() {
        assert!(ProfileParser::is_set_charging_profile_action(
            "SetChargingProfile"
        ));
        assert!(ProfileParser::is_set_charging_profile_action(
            "SetChargingProfileRequest"
        ));
        assert!(!ProfileParser::is_set_charging_profile_action("Heartbeat"));
        assert!(!ProfileParser::is_set_charging_profile_action(
            "setchargingprofile"
        ));
    }

    #[test]
    fn unknown_version_defaults_to_v16_key() {
        let parser = ProfileParser::new(OcppVersion::Unknown);
        assert!(parser
            .parse_set_charging_profile(&v16_payload())
            .unwrap()
            .is_some());
    }
}
