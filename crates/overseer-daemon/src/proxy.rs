//! Reverse-proxy route registration
//!
//! Workers started with `addWithProxy` are published behind the reverse proxy
//! under `(service, name, key)` where `key` is the build version.

use async_trait::async_trait;
use dashmap::DashMap;
use overseer_types::WorkerRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single proxy route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    /// Service namespace the route belongs to
    pub service: String,
    pub name: String,
    /// Build version as a string
    pub key: String,
    /// Upstream `hostname:port`
    pub host: String,
    /// Free-form data, the worker environment
    pub data: String,
    pub enabled: bool,
}

impl ProxyRoute {
    /// Build the enabled route for a started worker.
    pub fn for_worker(service: impl Into<String>, worker: &WorkerRecord) -> Self {
        Self {
            service: service.into(),
            name: worker.name.clone(),
            key: worker.version.to_string(),
            host: format!("{}:{}", worker.hostname, worker.port),
            data: worker.environment.clone(),
            enabled: true,
        }
    }
}

/// Proxy registry errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

/// Route registration contract
#[async_trait]
pub trait ProxyRegistry: Send + Sync {
    /// Create or replace a route
    async fn upsert_route(&self, route: ProxyRoute) -> Result<(), ProxyError>;
}

type RouteKey = (String, String, String, String);

/// In-memory route table
#[derive(Debug, Default)]
pub struct InMemoryProxyRegistry {
    routes: DashMap<RouteKey, ProxyRoute>,
}

impl InMemoryProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every registered route
    pub fn routes(&self) -> Vec<ProxyRoute> {
        let mut routes: Vec<_> = self.routes.iter().map(|r| r.value().clone()).collect();
        routes.sort_by(|a, b| (&a.name, &a.key, &a.host).cmp(&(&b.name, &b.key, &b.host)));
        routes
    }
}

#[async_trait]
impl ProxyRegistry for InMemoryProxyRegistry {
    async fn upsert_route(&self, route: ProxyRoute) -> Result<(), ProxyError> {
        if route.name.is_empty() {
            return Err(ProxyError::InvalidRoute("route name is empty".to_string()));
        }

        let key = (
            route.service.clone(),
            route.name.clone(),
            route.key.clone(),
            route.host.clone(),
        );
        tracing::debug!(
            service = %route.service,
            name = %route.name,
            key = %route.key,
            host = %route.host,
            "Proxy route registered"
        );
        self.routes.insert(key, route);
        Ok(())
    }
}
