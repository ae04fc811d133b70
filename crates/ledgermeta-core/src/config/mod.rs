//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `LEDGERMETA_CONFIG` env var
//! 3. **Environment variables**: `LEDGERMETA__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP server settings (bind address and port)
//! - [`LedgerConfig`]: Upstream ledger nodes and pool timings
//! - [`MetricsConfig`]: Prometheus metrics endpoint
//! - [`LoggingConfig`]: Log level and format
//!
//! # Validation
//!
//! Configuration is validated at load time by [`AppConfig::validate`]. Invalid
//! configurations (e.g. no enabled node, zero timeouts) return errors rather than
//! failing silently.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 4080
//!
//! [[ledger.nodes]]
//! url = "wss://xrplcluster.com"
//! connections = 2
//!
//! [[ledger.nodes]]
//! url = "wss://s2.ripple.com"
//! allowed_commands = ["ledger", "ledger_data", "subscribe"]
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc, time::Duration};

use crate::types::NodeConfig;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `4080`.
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// One upstream ledger node as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    /// WebSocket endpoint. Must start with `ws://` or `wss://`.
    pub url: String,

    /// Number of parallel sessions to open. Defaults to `1`.
    #[serde(default = "default_connections")]
    pub connections: u32,

    /// Keeps the entry in the file without opening any session. Defaults to `false`.
    #[serde(default)]
    pub disabled: bool,

    /// Commands this node may receive. Omit to allow every command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_commands: Option<Vec<String>>,
}

fn default_connections() -> u32 {
    1
}

impl NodeEntry {
    #[must_use]
    pub fn to_node_config(&self) -> NodeConfig {
        NodeConfig {
            url: Arc::from(self.url.as_str()),
            connections: self.connections,
            disabled: self.disabled,
            allowed_commands: self.allowed_commands.clone(),
        }
    }
}

/// Upstream ledger nodes and the timings of the pool in front of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// How long a request may wait in the queue, in seconds. Defaults to `30`.
    pub request_timeout_seconds: u64,

    /// Dispatcher polling cadence in milliseconds. Defaults to `100`.
    pub dispatch_interval_ms: u64,

    /// Wait between connection attempts in seconds. Defaults to `3`.
    pub reconnect_delay_seconds: u64,

    /// Per-call guard inside a session, in seconds. Defaults to `60`.
    pub transport_timeout_seconds: u64,

    /// Number of recent event keys kept for deduplication. Defaults to `1000`.
    pub dedup_capacity: usize,

    /// Capacity of the subscriber event channel. Defaults to `1024`.
    pub event_buffer: usize,

    /// Nodes in order of preference.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeEntry>,
}

fn default_nodes() -> Vec<NodeEntry> {
    vec![
        NodeEntry {
            url: "wss://xrplcluster.com".to_string(),
            connections: 2,
            disabled: false,
            allowed_commands: None,
        },
        NodeEntry {
            url: "wss://s2.ripple.com".to_string(),
            connections: 1,
            disabled: false,
            allowed_commands: None,
        },
    ]
}

impl LedgerConfig {
    /// Returns every node entry as a pool node, disabled ones included.
    #[must_use]
    pub fn pool_nodes(&self) -> Vec<NodeConfig> {
        self.nodes.iter().map(NodeEntry::to_node_config).collect()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Returns the number of sessions the enabled nodes open together.
    #[must_use]
    pub fn session_count(&self) -> u32 {
        self.nodes.iter().filter(|node| !node.disabled).map(|node| node.connections).sum()
    }
}

/// Prometheus metrics collection and export configuration.
///
/// When enabled, metrics are exposed at `/metrics` on the configured port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled. Defaults to `true`.
    pub enabled: bool,

    /// Port to expose Prometheus metrics endpoint. Defaults to `9090`.
    pub prometheus_port: Option<u16>,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Root application configuration containing all subsystem settings.
///
/// Loaded from TOML files and environment variables with the `LEDGERMETA` prefix, using
/// `__` as a separator for nested fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment (e.g., "development", "production"). Defaults to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: 4080 }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            dispatch_interval_ms: 100,
            reconnect_delay_seconds: 3,
            transport_timeout_seconds: 60,
            dedup_capacity: 1000,
            event_buffer: 1024,
            nodes: default_nodes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, prometheus_port: Some(9090) }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            ledger: LedgerConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `LEDGERMETA__` prefix can override any scalar value
    /// (e.g., `LEDGERMETA__LEDGER__REQUEST_TIMEOUT_SECONDS=10`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 4080)?
            .set_default("ledger.request_timeout_seconds", 30)?
            .set_default("ledger.dispatch_interval_ms", 100)?
            .set_default("ledger.reconnect_delay_seconds", 3)?
            .set_default("ledger.transport_timeout_seconds", 60)?
            .set_default("ledger.dedup_capacity", 1000)?
            .set_default("ledger.event_buffer", 1024)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.prometheus_port", 9090)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("LEDGERMETA").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The path can be overridden using the `LEDGERMETA_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("LEDGERMETA_CONFIG")
            .unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    /// Returns the configured nodes in pool form, disabled ones included.
    #[must_use]
    pub fn pool_nodes(&self) -> Vec<NodeConfig> {
        self.ledger.pool_nodes()
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - At least one enabled node is configured
    /// - Node URLs use `ws://` or `wss://` and open at least one connection
    /// - Timeouts, intervals and capacities are greater than zero
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger.nodes.iter().all(|node| node.disabled) {
            return Err("No enabled ledger nodes configured".to_string());
        }

        for node in &self.ledger.nodes {
            if node.url.is_empty() {
                return Err("Empty URL for ledger node".to_string());
            }
            if !node.url.starts_with("ws://") && !node.url.starts_with("wss://") {
                return Err(format!("Invalid WebSocket URL for ledger node: {}", node.url));
            }
            if node.connections == 0 {
                return Err(format!("Ledger node {} must open at least one connection", node.url));
            }
            if node.allowed_commands.as_ref().is_some_and(Vec::is_empty) {
                return Err(format!("Ledger node {} allows no commands", node.url));
            }
        }

        if self.ledger.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if self.ledger.dispatch_interval_ms == 0 {
            return Err("Dispatch interval must be greater than 0".to_string());
        }

        if self.ledger.reconnect_delay_seconds == 0 {
            return Err("Reconnect delay must be greater than 0".to_string());
        }

        if self.ledger.transport_timeout_seconds == 0 {
            return Err("Transport timeout must be greater than 0".to_string());
        }

        if self.ledger.dedup_capacity == 0 {
            return Err("Dedup capacity must be greater than 0".to_string());
        }

        if self.ledger.event_buffer == 0 {
            return Err("Event buffer must be greater than 0".to_string());
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
