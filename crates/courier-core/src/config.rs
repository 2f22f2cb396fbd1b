//! Configuration system for Courier.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $COURIER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/courier/config.toml
//!   3. ~/.config/courier/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::channel::ChannelDescriptor;
use crate::wire::{ACOUSTIC_RELAY_SERVICE, ACOUSTIC_TIMEOUT_SECS, COMM_TIMEOUT_MILLIS};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub api: ApiConfig,
    pub delivery: DeliveryConfig,
    pub satellite: SatelliteConfig,
    /// Channels in priority order, fastest and most reliable first.
    pub channels: Vec<ChannelDescriptor>,
    /// Systems known before any announcement arrives.
    pub systems: Vec<SystemConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Our own system address, stamped as the source of every message.
    pub system_id: u16,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address for the UDP link socket.
    pub bind_addr: String,
    /// UDP port for the link socket. Announcements arrive here too.
    pub port: u16,
    /// Systems not heard from within this window are no longer directly reachable.
    pub system_ttl_secs: u64,
    /// Outbound datagram queue depth.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Port of the local HTTP API. Binds 127.0.0.1 only.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Channel names tried when a request does not name any. Empty = all channels.
    pub default_channels: Vec<String>,
    /// Timeout for requests that do not carry one.
    pub timeout_millis: u64,
    /// Deadline handed to relays for acoustic transmission requests.
    pub acoustic_timeout_secs: u64,
    /// Service name that marks a system as an acoustic relay.
    pub relay_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteConfig {
    /// Whether the satellite modem service is present at all.
    pub enabled: bool,
    /// Directory where outgoing envelopes are spooled for the modem service.
    pub spool_dir: PathBuf,
}

/// A statically known system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    pub id: u16,
    /// UDP address, e.g. "10.0.10.21:6002". None = address learned from announcements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    /// Systems this one can reach over its acoustic modem.
    #[serde(default)]
    pub acoustic_reach: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            api: ApiConfig::default(),
            delivery: DeliveryConfig::default(),
            satellite: SatelliteConfig::default(),
            channels: ChannelDescriptor::defaults(),
            systems: Vec::new(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            system_id: 0x4001,
            name: "courier".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 6002,
            system_ttl_secs: 10,
            queue_depth: 256,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9480 }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_channels: vec![
                "Wifi".to_string(),
                "Acoustic".to_string(),
                "Satellite".to_string(),
            ],
            timeout_millis: COMM_TIMEOUT_MILLIS,
            acoustic_timeout_secs: ACOUSTIC_TIMEOUT_SECS,
            relay_service: ACOUSTIC_RELAY_SERVICE.to_string(),
        }
    }
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spool_dir: data_dir().join("spool"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("courier")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("courier")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CourierConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a specific file, falling back to defaults when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(CourierConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("COURIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CourierConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply COURIER_* overrides. `lookup` maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |v: &str| v == "true" || v == "1";

        if let Some(v) = lookup("COURIER_IDENTITY__SYSTEM_ID") {
            if let Some(id) = parse_system_id(&v) {
                self.identity.system_id = id;
            }
        }
        if let Some(v) = lookup("COURIER_IDENTITY__NAME") {
            self.identity.name = v;
        }
        if let Some(v) = lookup("COURIER_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("COURIER_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("COURIER_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Some(v) = lookup("COURIER_DELIVERY__DEFAULT_CHANNELS") {
            self.delivery.default_channels = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("COURIER_DELIVERY__TIMEOUT_MILLIS") {
            if let Ok(ms) = v.parse() {
                self.delivery.timeout_millis = ms;
            }
        }
        if let Some(v) = lookup("COURIER_SATELLITE__ENABLED") {
            self.satellite.enabled = flag(&v);
        }
        if let Some(v) = lookup("COURIER_SATELLITE__SPOOL_DIR") {
            self.satellite.spool_dir = PathBuf::from(v);
        }
    }
}

/// Accepts decimal or 0x-prefixed hex.
fn parse_system_id(v: &str) -> Option<u16> {
    match v.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => v.parse().ok(),
    }
}
