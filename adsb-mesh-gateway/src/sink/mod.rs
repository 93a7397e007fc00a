//! Output sinks: everything an eligible aircraft summary can be pushed to.
//!
//! Each sink renders its own wire form from the shared `AircraftSummary`.

use std::sync::Arc;
use std::time::Duration;

use adsb_mesh_core::config::Config;
use adsb_mesh_core::{AircraftSummary, GatewayError};
use thiserror::Error;

use crate::crypto::{ChannelKey, CryptoError};
use crate::proto::ProtoError;

pub mod console;
pub mod meshtastic;
pub mod mudp;
pub mod webhook;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("encode error: {0}")]
    Encode(#[from] ProtoError),
    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Config(#[from] GatewayError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A downstream consumer of eligible-and-due aircraft.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn send(&self, summary: &AircraftSummary) -> Result<(), SinkError>;
}

/// Build every sink the config enables.
///
/// A sink that cannot be set up is logged and left out; the gateway still
/// runs with the rest. With nothing enabled, summaries go to the log.
pub async fn build_sinks(config: &Config) -> Vec<Arc<dyn Sink>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if config.meshtastic.enabled {
        if let Some(sink) = meshtastic_sink(config).await {
            sinks.push(Arc::new(sink));
        }
    }

    if config.mudp.enabled {
        let target = format!("{}:{}", config.mudp.group, config.mudp.port);
        log::info!("Initializing MUDP broadcasting to {target}...");
        let identity = mudp::NodeIdentity {
            node_id: config.mudp.node_id.clone(),
            long_name: config.mudp.long_name.clone(),
            short_name: config.mudp.short_name.clone(),
        };
        match mudp_channel(config) {
            Ok(channel) => match mudp::MudpSink::bind(&target, identity, channel).await {
                Ok(sink) => {
                    log::info!(
                        "MUDP gateway node id: {} ({:08x}), name: {}, channel: {} ({})",
                        config.mudp.node_id,
                        sink.node_num(),
                        config.mudp.long_name,
                        config.mudp.channel,
                        if sink.encrypted() { "encrypted" } else { "plaintext" }
                    );
                    if let Err(e) = sink.announce().await {
                        log::warn!("MUDP node announcement failed: {e}");
                    }
                    sinks.push(Arc::new(sink));
                }
                Err(e) => log::warn!("MUDP disabled, could not set up {target}: {e}"),
            },
            Err(e) => log::warn!("MUDP disabled: {e}"),
        }
    }

    if let Some(url) = &config.webhook.url {
        log::info!("Posting aircraft summaries to webhook {url}");
        sinks.push(Arc::new(webhook::WebhookSink::new(url)));
    }

    if sinks.is_empty() {
        log::info!("No output sinks enabled; summaries will be logged only");
        sinks.push(Arc::new(console::ConsoleSink));
    }

    sinks
}

/// TCP when a host is set, else the configured or detected serial port.
async fn meshtastic_sink(config: &Config) -> Option<meshtastic::MeshtasticSink> {
    let sink = match (&config.meshtastic.host, &config.meshtastic.serial_port) {
        (Some(host), _) => meshtastic::MeshtasticSink::tcp(host, config.meshtastic.port),
        (None, Some(path)) => meshtastic::MeshtasticSink::serial(path),
        (None, None) => match meshtastic::detect_serial_port() {
            Some(path) => {
                log::info!("Found serial port {path}");
                meshtastic::MeshtasticSink::serial(&path)
            }
            None => {
                log::warn!("No Meshtastic host configured and no serial radio found; radio output disabled");
                return None;
            }
        },
    };

    log::info!(
        "Attempting to connect to Meshtastic device at {}...",
        sink.transport()
    );
    match sink.connect().await {
        Ok(()) => log::info!("Successfully connected to Meshtastic device."),
        Err(e) => log::warn!(
            "Could not connect to Meshtastic device at {}: {e}; will retry on first send",
            sink.transport()
        ),
    }
    Some(sink)
}

fn mudp_channel(config: &Config) -> Result<Option<ChannelKey>, SinkError> {
    let key = config.mudp.psk_bytes()?;
    if key.is_empty() {
        return Ok(None);
    }
    Ok(Some(ChannelKey::new(&config.mudp.channel, key)?))
}
