//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built from an optional TOML file plus CLI/environment overrides
//! (assembled in `main.rs`) or from defaults suitable for local development.
//!
//! Configuration stays a plain struct: no global state, no environment
//! variable reads inside the domain.  That keeps the bridge easy to embed in
//! tests — every integration test constructs a `BridgeConfig` by hand.
//!
//! # Serde default values
//!
//! Every field of the TOML schema carries a `#[serde(default = ...)]`, so a
//! partial file (or no file at all) always produces a working configuration,
//! and files written for older versions keep parsing after new fields are
//! added.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A host/port pair did not form a valid socket address.
    #[error("invalid gateway address: {0}")]
    InvalidAddress(String),
}

// ── Runtime configuration ─────────────────────────────────────────────────────

/// All runtime configuration for the bridge.
///
/// Build this struct once at startup and share it by value; every component
/// copies the settings it needs at construction time.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The gateway's command port — pooled, write-mostly connections.
    pub command_addr: SocketAddr,
    /// The gateway's event port — a single read-only broadcast connection.
    pub event_addr: SocketAddr,
    /// Number of pooled command connections.
    pub pool_size: usize,
    /// Healthy connections required before the pool reports started.
    pub min_healthy: usize,
    /// First reconnect delay; doubles per consecutive failure.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
    /// Minimum spacing between dispatched commands.
    pub queue_interval: Duration,
    /// Command queue capacity; 0 means unbounded.
    pub queue_max_size: usize,
    /// How long a relative command waits for a level reading before it is
    /// dropped.
    pub correlation_timeout: Duration,
    /// Debounce window between all-connected signals.
    pub ready_debounce: Duration,
    /// Leading topic segment for everything the bridge publishes/consumes.
    pub topic_prefix: String,
}

impl Default for BridgeConfig {
    /// Defaults suitable for a gateway on localhost.
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            command_addr: "127.0.0.1:20023".parse().unwrap(),
            event_addr: "127.0.0.1:20025".parse().unwrap(),
            pool_size: 3,
            min_healthy: 1,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            queue_interval: Duration::from_millis(200),
            queue_max_size: 1000,
            correlation_timeout: Duration::from_secs(10),
            ready_debounce: Duration::from_secs(10),
            topic_prefix: "lumen".to_string(),
        }
    }
}

// ── TOML file schema ──────────────────────────────────────────────────────────

/// On-disk configuration file schema.
///
/// ```toml
/// [gateway]
/// host = "192.168.1.10"
/// command_port = 20023
/// event_port = 20025
/// pool_size = 3
///
/// [queue]
/// interval_ms = 200
/// max_size = 1000
///
/// [bridge]
/// topic_prefix = "lumen"
/// ready_debounce_secs = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// Gateway IP address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port for the command protocol.
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    /// TCP port for the unsolicited event stream.
    #[serde(default = "default_event_port")]
    pub event_port: u16,
    /// Number of pooled command connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Healthy connections required before the pool reports started.
    #[serde(default = "default_min_healthy")]
    pub min_healthy: usize,
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

/// Outbound command queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSection {
    /// Minimum spacing between dispatched commands, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Queue capacity; 0 means unbounded.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

/// Bridge-level behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Leading topic segment for published and consumed topics.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Debounce window between all-connected signals, in seconds.
    #[serde(default = "default_ready_debounce_secs")]
    pub ready_debounce_secs: u64,
    /// Relative-command reply timeout, in seconds.
    #[serde(default = "default_correlation_timeout_secs")]
    pub correlation_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_command_port() -> u16 {
    20023
}
fn default_event_port() -> u16 {
    20025
}
fn default_pool_size() -> usize {
    3
}
fn default_min_healthy() -> usize {
    1
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_interval_ms() -> u64 {
    200
}
fn default_max_size() -> usize {
    1000
}
fn default_topic_prefix() -> String {
    "lumen".to_string()
}
fn default_ready_debounce_secs() -> u64 {
    10
}
fn default_correlation_timeout_secs() -> u64 {
    10
}

impl Default for GatewaySection {
    fn default() -> Self {
        // Route through serde so the field defaults stay the single source
        // of truth.
        toml::from_str("").expect("empty gateway section must deserialize")
    }
}

impl Default for QueueSection {
    fn default() -> Self {
        toml::from_str("").expect("empty queue section must deserialize")
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        toml::from_str("").expect("empty bridge section must deserialize")
    }
}

impl FileConfig {
    /// Loads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Converts the file schema into the runtime [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] when the host/port pair does
    /// not form a valid socket address.
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let command_addr = parse_addr(&self.gateway.host, self.gateway.command_port)?;
        let event_addr = parse_addr(&self.gateway.host, self.gateway.event_port)?;
        Ok(BridgeConfig {
            command_addr,
            event_addr,
            pool_size: self.gateway.pool_size.max(1),
            min_healthy: self.gateway.min_healthy.max(1),
            reconnect_base: Duration::from_millis(self.gateway.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.gateway.reconnect_max_ms),
            queue_interval: Duration::from_millis(self.queue.interval_ms),
            queue_max_size: self.queue.max_size,
            correlation_timeout: Duration::from_secs(self.bridge.correlation_timeout_secs),
            ready_debounce: Duration::from_secs(self.bridge.ready_debounce_secs),
            topic_prefix: self.bridge.topic_prefix,
        })
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    format!("{host}:{port}")
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(format!("{host}:{port}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
