//! Configuration system for a TMSN node
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (TMSN_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::network::{Direction, NetworkConfig, PeerDescriptor, Subscription, DEFAULT_MAX_FRAME_SIZE};

/// Default TCP port shared by every node of a cluster
pub const DEFAULT_LISTEN_PORT: u16 = 7000;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identity and listening settings
    pub node: NodeSettings,

    /// Network tunables
    pub network: NetworkSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Subscription list: every node this one must be linked to
    pub peers: Vec<PeerDescriptor>,
}

/// Node identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Identity announced to peers (defaults to the host name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// TCP listen port (0 = OS-assigned)
    pub listen_port: u16,

    /// Accept inbound peers that are not in the subscription list
    pub listen_for_late_joiners: bool,
}

/// Network tunables, durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Interface to bind the listener on
    pub bind_host: String,

    /// Largest accepted frame payload in bytes
    pub max_frame_size: u32,

    /// Outbound connect timeout
    pub connect_timeout_ms: u64,

    /// Identity exchange timeout
    pub handshake_timeout_ms: u64,

    /// First dialer retry delay
    pub initial_backoff_ms: u64,

    /// Maximum dialer retry delay
    pub max_backoff_ms: u64,

    /// Per-peer outbound queue capacity
    pub outbound_queue_capacity: usize,

    /// Best-effort flush window when a link closes
    pub drain_timeout_ms: u64,

    /// Capacity of the application channels
    pub channel_capacity: usize,

    /// both, send-only or receive-only
    pub direction: Direction,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// File rotation: minutely, hourly, daily or never
    pub rotation: String,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,

    /// Interval between traffic statistics log lines (0 = disabled)
    pub stats_interval_secs: u64,
}

// Default implementations

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            id: None,
            listen_port: DEFAULT_LISTEN_PORT,
            listen_for_late_joiners: false,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        let defaults = NetworkConfig::default();
        Self {
            bind_host: defaults.bind_host,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            handshake_timeout_ms: defaults.handshake_timeout.as_millis() as u64,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            outbound_queue_capacity: defaults.outbound_queue_capacity,
            drain_timeout_ms: defaults.drain_timeout.as_millis() as u64,
            channel_capacity: 1024,
            direction: Direction::Both,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: "daily".to_string(),
            max_files: 5,
            json_format: false,
            stats_interval_secs: 30,
        }
    }
}

impl NodeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        for path in search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Node settings
        if let Ok(val) = std::env::var("TMSN_NODE_ID") {
            self.node.id = Some(val);
        }
        if let Ok(val) = std::env::var("TMSN_LISTEN_PORT") {
            if let Ok(n) = val.parse() {
                self.node.listen_port = n;
            }
        }
        if let Ok(val) = std::env::var("TMSN_LATE_JOINERS") {
            self.node.listen_for_late_joiners = parse_bool(&val);
        }

        // Peers: comma-separated "identity@address" entries replace the file's list
        if let Ok(val) = std::env::var("TMSN_PEERS") {
            self.peers = parse_peer_list(&val);
        }

        // Network settings
        if let Ok(val) = std::env::var("TMSN_BIND_HOST") {
            self.network.bind_host = val;
        }
        if let Ok(val) = std::env::var("TMSN_MAX_FRAME_SIZE") {
            if let Ok(n) = val.parse() {
                self.network.max_frame_size = n;
            }
        }
        if let Ok(val) = std::env::var("TMSN_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.network.connect_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("TMSN_MAX_BACKOFF_MS") {
            if let Ok(n) = val.parse() {
                self.network.max_backoff_ms = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("TMSN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("TMSN_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("TMSN_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Identity and peer list share the runtime checks
        Subscription::new(&self.node_id(), &self.peers)?;

        let net = &self.network;
        if net.max_frame_size == 0 {
            return Err(Error::config_field_invalid("network.max_frame_size", "must be > 0"));
        }
        if net.outbound_queue_capacity == 0 {
            return Err(Error::config_field_invalid(
                "network.outbound_queue_capacity",
                "must be > 0",
            ));
        }
        if net.channel_capacity == 0 {
            return Err(Error::config_field_invalid("network.channel_capacity", "must be > 0"));
        }
        if net.connect_timeout_ms == 0 || net.handshake_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "network.connect_timeout_ms",
                "connect and handshake timeouts must be > 0",
            ));
        }
        if net.initial_backoff_ms > net.max_backoff_ms {
            return Err(Error::config_field_invalid(
                "network.initial_backoff_ms",
                format!(
                    "initial backoff ({}ms) exceeds max backoff ({}ms)",
                    net.initial_backoff_ms, net.max_backoff_ms
                ),
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        let valid_rotations = ["minutely", "hourly", "daily", "never"];
        if !valid_rotations.contains(&self.logging.rotation.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.rotation",
                format!(
                    "Invalid rotation '{}'. Must be one of: {}",
                    self.logging.rotation,
                    valid_rotations.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Identity of this node: the configured id, else the host name
    pub fn node_id(&self) -> String {
        if let Some(id) = self.node.id.as_ref().filter(|id| !id.is_empty()) {
            return id.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "tmsn-node".to_string())
    }

    /// Runtime tunables for `start_network_with_config`
    pub fn network_config(&self) -> NetworkConfig {
        let net = &self.network;
        NetworkConfig {
            bind_host: net.bind_host.clone(),
            max_frame_size: net.max_frame_size,
            connect_timeout: Duration::from_millis(net.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(net.handshake_timeout_ms),
            initial_backoff: Duration::from_millis(net.initial_backoff_ms),
            max_backoff: Duration::from_millis(net.max_backoff_ms),
            outbound_queue_capacity: net.outbound_queue_capacity,
            drain_timeout: Duration::from_millis(net.drain_timeout_ms),
            direction: net.direction,
        }
    }
}

/// Standard configuration file locations, in search order
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("tmsn.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tmsn").join("node.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".tmsn").join("node.toml"));
    }
    paths.push(PathBuf::from("/etc/tmsn/node.toml"));
    paths
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Parse `"a@10.0.0.1:7000,b@10.0.0.2"`; malformed entries are skipped
pub fn parse_peer_list(val: &str) -> Vec<PeerDescriptor> {
    val.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.split_once('@'))
        .map(|(identity, address)| PeerDescriptor::new(identity.trim(), address.trim()))
        .collect()
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tmsn")
                .join("node.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, generate_default_config())?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# TMSN node configuration

[node]
# Identity announced to peers (defaults to the host name)
# id = "worker-1"

# TCP listen port, shared by every node of the cluster
listen_port = 7000

# Accept inbound peers that are not listed under [[peers]]
listen_for_late_joiners = false

[network]
# Interface to bind the listener on
bind_host = "0.0.0.0"

# Largest accepted frame payload in bytes (64 MB)
max_frame_size = 67108864

# Outbound connect timeout in milliseconds
connect_timeout_ms = 5000

# Identity exchange timeout in milliseconds
handshake_timeout_ms = 5000

# Dialer retry delays in milliseconds
initial_backoff_ms = 250
max_backoff_ms = 10000

# Payloads queued per peer before new ones are dropped for that peer
outbound_queue_capacity = 256

# Best-effort flush window when a link closes, in milliseconds
drain_timeout_ms = 500

# Capacity of the application channels
channel_capacity = 1024

# both, send-only or receive-only
direction = "both"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.tmsn/logs/node.log"

# File rotation: minutely, hourly, daily or never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

# Seconds between traffic statistics log lines (0 = disabled)
stats_interval_secs = 30

# Every node of the cluster, this one included; an address without a port
# uses listen_port.
# [[peers]]
# identity = "worker-1"
# address = "10.0.0.1"
#
# [[peers]]
# identity = "worker-2"
# address = "10.0.0.2:7000"
"#
    .to_string()
}
