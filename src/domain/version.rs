//! OCPP protocol version
//!
//! The version is pinned per connection from the negotiated WebSocket
//! subprotocol and never re-detected per message.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0
    V20,
    /// OCPP 2.0.1
    V201,
    /// Subprotocol absent or not recognized
    Unknown,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier for this OCPP version.
    ///
    /// Used in the `Sec-WebSocket-Protocol` header during handshake.
    /// `Unknown` falls back to the 1.6 identifier, matching [`detect`].
    ///
    /// [`detect`]: Self::detect
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 | Self::Unknown => "ocpp1.6",
            Self::V20 => "ocpp2.0",
            Self::V201 => "ocpp2.0.1",
        }
    }

    /// Subprotocols the relay advertises during handshake, newest first.
    pub const ADVERTISED: &'static [OcppVersion] = &[Self::V201, Self::V20, Self::V16];

    /// Detect the OCPP version from a negotiated subprotocol string.
    ///
    /// Case-insensitive substring match, checked newest-first so that
    /// `ocpp2.0.1` is not mistaken for `ocpp2.0`. Empty or unrecognized
    /// input falls back to 1.6 with a logged warning, never an error.
    pub fn detect(subprotocol: &str) -> Self {
        let s = subprotocol.trim().to_ascii_lowercase();

        if s.contains("2.0.1") {
            Self::V201
        } else if s.contains("2.0") {
            Self::V20
        } else if s.contains("1.6") {
            Self::V16
        } else {
            warn!(
                subprotocol,
                "Unrecognized OCPP subprotocol, defaulting to 1.6"
            );
            Self::V16
        }
    }

    /// Human-readable version string.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V20 => "2.0",
            Self::V201 => "2.0.1",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}
