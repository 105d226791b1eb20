//! Configuration for overseer-daemon

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Heartbeat and reaping configuration
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Deployment reconciliation configuration
    #[serde(default)]
    pub deployments: DeploymentsConfig,

    /// Broker addressing
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Reverse-proxy registration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8090)),
            enable_cors: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Time a worker has until its next heartbeat is due
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,

    /// Extra time tolerated after a missed heartbeat before eviction
    #[serde(default = "default_heartbeat_grace")]
    pub grace_secs: u64,

    /// How often the reaper scans the registry
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval(),
            grace_secs: default_heartbeat_grace(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

/// Deployment reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentsConfig {
    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

/// Broker exchange and routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Topic exchange shared with workers
    #[serde(default = "default_worker_exchange")]
    pub exchange: String,

    /// Routing key workers publish commands and samples on
    #[serde(default = "default_inbound_key")]
    pub inbound_key: String,

    /// Fanout exchange declared for client broadcasts
    #[serde(default = "default_client_exchange")]
    pub client_exchange: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            exchange: default_worker_exchange(),
            inbound_key: default_inbound_key(),
            client_exchange: default_client_exchange(),
        }
    }
}

/// Reverse-proxy registration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Service namespace routes are registered under
    #[serde(default = "default_proxy_service")]
    pub service: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service: default_proxy_service(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_grace() -> u64 {
    5
}

fn default_reap_interval() -> u64 {
    2
}

fn default_reconcile_interval() -> u64 {
    12 * 60 * 60
}

fn default_worker_exchange() -> String {
    "workerExchange".to_string()
}

fn default_inbound_key() -> String {
    "input.worker".to_string()
}

fn default_client_exchange() -> String {
    "clientExchange".to_string()
}

fn default_proxy_service() -> String {
    "koding".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Nested keys use a double underscore, e.g. OVERSEER_HEARTBEAT__GRACE_SECS
        builder = builder.add_source(
            config::Environment::with_prefix("OVERSEER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the background loops cannot run with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.heartbeat.reap_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "heartbeat.reap_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.deployments.reconcile_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "deployments.reconcile_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
