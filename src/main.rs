//!
//! OCPP man-in-the-middle interception relay.
//! Reads configuration from TOML file (~/.config/ocpp-mitm-lab/config.toml).

use std::sync::Arc;

use tracing::{error, info};

use ocpp_mitm_lab::attack::AttackEngine;
use ocpp_mitm_lab::relay::MitmRelay;
use ocpp_mitm_lab::sink::TracingSink;
use ocpp_mitm_lab::support::shutdown::listen_for_shutdown_signals;
use ocpp_mitm_lab::{default_config_path, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("MITM_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level)),
                )
                .init();
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config: {}. Using defaults.", e);
            AppConfig::default()
        }
    };

    info!("Starting OCPP interception relay...");

    let attack_config = app_cfg.attack.to_attack_config();
    info!(
        enabled = attack_config.enabled,
        strategy = ?attack_config.strategy,
        "Attack engine configured"
    );

    let sink = Arc::new(TracingSink);
    let engine = Arc::new(AttackEngine::new(attack_config, sink));
    let relay = Arc::new(MitmRelay::new(app_cfg.relay.to_relay_config(), engine));

    // Stop the relay on SIGTERM / SIGINT
    let shutdown = relay.shutdown_signal();
    tokio::spawn(listen_for_shutdown_signals(shutdown));

    if let Err(e) = relay.run().await {
        error!("Relay error: {}", e);
        return Err(e);
    }

    info!("👋 Relay shutdown complete");
    Ok(())
}
