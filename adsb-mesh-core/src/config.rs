//! Configuration file model for the gateway.
//!
//! Every key is optional; missing keys fall back to the defaults below, and
//! command-line flags override whatever the file says.
//!
//! ```toml
//! update_interval = 300
//! mark_sent_policy = "attempted"
//!
//! [feed]
//! host = "localhost"
//! port = 30003
//!
//! [meshtastic]
//! host = "192.168.1.40"
//!
//! [mudp]
//! enabled = true
//! channel = "LongFast"
//! psk = "default"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::dispatch::MarkSentPolicy;
use crate::gate::DEFAULT_UPDATE_INTERVAL;
use crate::store::DEFAULT_RETENTION_SECS;
use crate::types::{GatewayError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seconds before the same aircraft is broadcast again.
    pub update_interval: f64,
    pub mark_sent_policy: MarkSentPolicy,
    /// Seconds of silence before an aircraft is forgotten. `0` keeps it forever.
    pub retention_secs: f64,
    pub debug: bool,
    pub feed: FeedConfig,
    pub meshtastic: MeshtasticConfig,
    pub mudp: MudpConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshtasticConfig {
    pub enabled: bool,
    /// TCP host of the device. Takes precedence over `serial_port`.
    pub host: Option<String>,
    pub port: u16,
    /// Serial device path, e.g. `/dev/ttyUSB0`. With neither this nor `host`
    /// set, the first USB serial port that looks like a radio is used.
    pub serial_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MudpConfig {
    pub enabled: bool,
    pub group: String,
    pub port: u16,
    pub node_id: String,
    pub long_name: String,
    pub short_name: String,
    /// Channel name; it feeds the channel hash receivers match on.
    pub channel: String,
    /// `"default"`, `"none"`, or a 16 or 32 byte key in hex.
    pub psk: String,
}

/// The well-known key behind `psk = "default"` (Meshtastic's `AQ==`).
pub const DEFAULT_PSK: [u8; 16] = [
    0xd4, 0xf1, 0xbb, 0x3a, 0x20, 0x29, 0x07, 0x59, 0xf0, 0xbc, 0xff, 0xab, 0xcf, 0x4e, 0x69, 0x01,
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            mark_sent_policy: MarkSentPolicy::default(),
            retention_secs: DEFAULT_RETENTION_SECS,
            debug: false,
            feed: FeedConfig::default(),
            meshtastic: MeshtasticConfig::default(),
            mudp: MudpConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            host: "localhost".into(),
            port: 30003,
        }
    }
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        MeshtasticConfig {
            enabled: true,
            host: None,
            port: 4403,
            serial_port: None,
        }
    }
}

impl Default for MudpConfig {
    fn default() -> Self {
        MudpConfig {
            enabled: false,
            group: "224.0.0.69".into(),
            port: 4403,
            node_id: "!adsb-gw".into(),
            long_name: "ADSB Gateway".into(),
            short_name: "ADSB".into(),
            channel: "LongFast".into(),
            psk: "default".into(),
        }
    }
}

impl MudpConfig {
    /// Channel key bytes. Empty means packets go out unencrypted.
    pub fn psk_bytes(&self) -> Result<Vec<u8>> {
        let psk = self.psk.trim();
        let key = match psk {
            "" | "none" => return Ok(Vec::new()),
            "default" => DEFAULT_PSK.to_vec(),
            hex_key => {
                let digits = hex_key.strip_prefix("0x").unwrap_or(hex_key);
                hex::decode(digits).map_err(|e| {
                    GatewayError::Config(format!("mudp.psk is not valid hex: {e}"))
                })?
            }
        };
        if key.len() != 16 && key.len() != 32 {
            return Err(GatewayError::Config(format!(
                "mudp.psk must be 16 or 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(key)
    }
}

impl Config {
    /// Check values that parse fine but make no sense.
    pub fn validate(&self) -> Result<()> {
        if !self.update_interval.is_finite() || self.update_interval < 0.0 {
            return Err(GatewayError::Config(format!(
                "update_interval must be a non-negative number of seconds, got {}",
                self.update_interval
            )));
        }
        if !self.retention_secs.is_finite() || self.retention_secs < 0.0 {
            return Err(GatewayError::Config(format!(
                "retention_secs must be a non-negative number of seconds, got {}",
                self.retention_secs
            )));
        }
        if self.retention_secs > 0.0 && self.retention_secs < self.update_interval {
            return Err(GatewayError::Config(format!(
                "retention_secs ({}) shorter than update_interval ({}) would re-broadcast evicted aircraft early",
                self.retention_secs, self.update_interval
            )));
        }
        self.mudp.psk_bytes()?;
        Ok(())
    }
}

/// Parse config text.
pub fn parse_config(text: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&text).map_err(|source| GatewayError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
