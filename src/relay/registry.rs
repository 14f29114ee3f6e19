//! Relay session registry
//!
//! One entry per live relayed connection, keyed by charge-point id. The
//! per-connection parser state lives here: inserted on connect, removed on
//! teardown, shared across the two pump tasks of a connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use crate::domain::OcppVersion;
use crate::parser::ProfileParser;

use super::Direction;

/// State of one relayed connection.
#[derive(Debug)]
pub struct RelaySession {
    pub charge_point_id: String,
    pub version: OcppVersion,
    pub parser: ProfileParser,
    pub connected_at: DateTime<Utc>,
    pub frames_client_to_server: u64,
    pub frames_server_to_client: u64,
}

impl RelaySession {
    fn new(charge_point_id: impl Into<String>, version: OcppVersion) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            version,
            parser: ProfileParser::new(version),
            connected_at: Utc::now(),
            frames_client_to_server: 0,
            frames_server_to_client: 0,
        }
    }
}

/// Active relayed sessions indexed by charge point ID.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, RelaySession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a connection with its pinned protocol version.
    pub fn register(&self, charge_point_id: impl Into<String>, version: OcppVersion) {
        let id = charge_point_id.into();
        info!(charge_point_id = %id, %version, "Session registered");
        self.sessions.insert(id.clone(), RelaySession::new(id, version));
    }

    /// Remove a connection's state on teardown.
    pub fn unregister(&self, charge_point_id: &str) {
        if self.sessions.remove(charge_point_id).is_some() {
            info!(charge_point_id, "Session unregistered");
        }
    }

    /// The version-pinned parser for a connection; a default 1.6 parser
    /// if the connection is unknown.
    pub fn parser_for(&self, charge_point_id: &str) -> ProfileParser {
        self.sessions
            .get(charge_point_id)
            .map(|s| s.parser)
            .unwrap_or_else(|| ProfileParser::new(OcppVersion::V16))
    }

    /// Bump the relayed-frame counter for one direction.
    pub fn record_frame(&self, charge_point_id: &str, direction: Direction) {
        if let Some(mut session) = self.sessions.get_mut(charge_point_id) {
            match direction {
                Direction::ClientToServer => session.frames_client_to_server += 1,
                Direction::ServerToClient => session.frames_server_to_client += 1,
            }
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Thread-safe shared registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;
