//! Message interception
//!
//! Decides per frame whether to hand off to the attack engine and performs
//! the rewrite. Deliberately fail-open: any parse or manipulation failure
//! forwards the original frame unchanged, because charging availability
//! takes priority over attack-simulation fidelity.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::attack::{AttackEngine, AttackError};
use crate::domain::{FrameError, OcppFrame};
use crate::parser::ParseError;

use super::registry::SharedSessionRegistry;
use super::Direction;

/// Everything that can interrupt a rewrite. Handled once, at the relay
/// boundary, by forwarding the original frame.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Attack(#[from] AttackError),
}

pub struct MessageInterceptor {
    engine: Arc<AttackEngine>,
    registry: SharedSessionRegistry,
}

impl MessageInterceptor {
    pub fn new(engine: Arc<AttackEngine>, registry: SharedSessionRegistry) -> Self {
        Self { engine, registry }
    }

    /// Inspect one frame and return what should be forwarded.
    ///
    /// Returns the rewritten frame for a SetChargingProfile CALL the
    /// engine chose to manipulate, and the input unchanged (same bytes)
    /// for everything else. Never fails.
    pub fn intercept(&self, raw: &str, direction: Direction, charge_point_id: &str) -> String {
        match self.try_rewrite(raw, direction, charge_point_id) {
            Ok(Some(rewritten)) => rewritten,
            Ok(None) => raw.to_string(),
            Err(e) => {
                // fail-open: the original frame goes through
                warn!(
                    charge_point_id,
                    %direction,
                    error = %e,
                    "Frame not rewritten, forwarding unchanged"
                );
                raw.to_string()
            }
        }
    }

    fn try_rewrite(
        &self,
        raw: &str,
        direction: Direction,
        charge_point_id: &str,
    ) -> Result<Option<String>, RewriteError> {
        // a frame that is not OCPP-J shaped is of no interest; the error
        // branch at the boundary forwards it unchanged
        let frame = OcppFrame::parse(raw)?;

        if !self.engine.should_manipulate(&frame) {
            return Ok(None);
        }

        let OcppFrame::Call {
            unique_id,
            action,
            payload,
        } = frame
        else {
            return Ok(None);
        };

        let parser = self.registry.parser_for(charge_point_id);
        let Some(profile) = parser.parse_set_charging_profile(&payload)? else {
            warn!(
                charge_point_id,
                version = %parser.version(),
                "No charging profile under the version-correct key"
            );
            return Ok(None);
        };

        let manipulated = self.engine.manipulate_charging_profile(&profile)?;

        let mut payload = payload;
        parser.reinsert_profile(&mut payload, &manipulated)?;

        let rewritten = OcppFrame::Call {
            unique_id,
            action: action.clone(),
            payload,
        }
        .serialize();

        info!(
            charge_point_id,
            %direction,
            action = %action,
            periods = manipulated.limits().len(),
            "Rewrote charging profile in flight"
        );
        Ok(Some(rewritten))
    }
}

/// Interceptor handle shared by the pump tasks.
pub type SharedInterceptor = Arc<MessageInterceptor>;

/// Build the interceptor with its engine from parts.
pub fn create_interceptor(
    engine: Arc<AttackEngine>,
    registry: SharedSessionRegistry,
) -> SharedInterceptor {
    Arc::new(MessageInterceptor::new(engine, registry))
}
