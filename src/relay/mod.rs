//! Protocol interception relay
//!
//! Sits between a charge point and its central system, relaying WebSocket
//! frames in both directions and rewriting charging-limit parameters
//! inside SetChargingProfile calls.

pub mod interceptor;
pub mod registry;
pub mod server;

use std::fmt;

pub use interceptor::MessageInterceptor;
pub use registry::{RelaySession, SessionRegistry};
pub use server::{MitmRelay, RelayConfig};

/// Which side of the relayed connection a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientToServer => write!(f, "CP->CS"),
            Self::ServerToClient => write!(f, "CS->CP"),
        }
    }
}
