//! Shared handles threaded through every component

use crate::broker::{Broker, LocalBroker};
use crate::config::{DaemonConfig, HeartbeatConfig};
use crate::proxy::{InMemoryProxyRegistry, ProxyRegistry};
use chrono::{DateTime, Duration, Utc};
use overseer_registry::{DeploymentStore, InMemoryRegistry, WorkerStore};
use std::sync::Arc;

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Time until the next heartbeat is due
    pub interval: Duration,
    /// Extra time tolerated past a missed deadline
    pub grace: Duration,
}

impl HeartbeatSettings {
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self {
            interval: Duration::seconds(config.interval_secs as i64),
            grace: Duration::seconds(config.grace_secs as i64),
        }
    }

    /// Next heartbeat deadline counted from `now`
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.interval
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

/// Process-wide collaborators, built once and shared by `Arc`
#[derive(Clone)]
pub struct Context {
    pub workers: Arc<dyn WorkerStore>,
    pub deployments: Arc<dyn DeploymentStore>,
    pub broker: Arc<dyn Broker>,
    pub proxy: Arc<dyn ProxyRegistry>,
    pub heartbeat: HeartbeatSettings,
    /// Topic exchange for worker traffic in both directions
    pub exchange: String,
    pub inbound_key: String,
    pub client_exchange: String,
    /// Service namespace for proxy routes
    pub proxy_service: String,
}

impl Context {
    pub fn new(
        config: &DaemonConfig,
        workers: Arc<dyn WorkerStore>,
        deployments: Arc<dyn DeploymentStore>,
        broker: Arc<dyn Broker>,
        proxy: Arc<dyn ProxyRegistry>,
    ) -> Self {
        Self {
            workers,
            deployments,
            broker,
            proxy,
            heartbeat: HeartbeatSettings::from_config(&config.heartbeat),
            exchange: config.broker.exchange.clone(),
            inbound_key: config.broker.inbound_key.clone(),
            client_exchange: config.broker.client_exchange.clone(),
            proxy_service: config.proxy.service.clone(),
        }
    }

    /// Context backed entirely by in-process implementations
    pub fn in_memory(config: &DaemonConfig) -> Self {
        let registry = Arc::new(InMemoryRegistry::new());
        Self::new(
            config,
            registry.clone(),
            registry,
            Arc::new(LocalBroker::new()),
            Arc::new(InMemoryProxyRegistry::new()),
        )
    }

    /// Routing key a worker listens on for its admission decision
    pub fn response_key(uuid: &str) -> String {
        format!("output.worker.{}", uuid)
    }
}
