//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::broker::{ExchangeKind, LocalBroker};
use crate::config::{DaemonConfig, StorageConfig};
use crate::context::Context;
use crate::error::{DaemonError, DaemonResult};
use crate::handler::Dispatcher;
use crate::proxy::InMemoryProxyRegistry;
use crate::scheduler::{supervise, DeploymentReconciler, HeartbeatReaper};
use futures_util::StreamExt;
use overseer_registry::{DeploymentStore, InMemoryRegistry, PostgresRegistry, WorkerStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Overseer daemon server
pub struct Server {
    config: DaemonConfig,
    context: Arc<Context>,
}

impl Server {
    /// Create a new server with the given configuration.
    ///
    /// An unreachable PostgreSQL backend is logged and replaced by the
    /// in-memory registry so the daemon keeps serving.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let (workers, deployments) = open_stores(&config.storage).await;

        let context = Context::new(
            &config,
            workers,
            deployments,
            Arc::new(LocalBroker::new()),
            Arc::new(InMemoryProxyRegistry::new()),
        );

        Ok(Self::with_context(config, context))
    }

    /// Create a server around pre-built collaborators
    pub fn with_context(config: DaemonConfig, context: Context) -> Self {
        Self {
            config,
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> Arc<Context> {
        self.context.clone()
    }

    /// Wire the broker and start the background loops.
    ///
    /// Every returned task ends once `shutdown` flips to `true`.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let context = &self.context;
        let mut tasks = Vec::new();

        if let Err(e) = context
            .broker
            .declare_exchange(&context.exchange, ExchangeKind::Topic)
            .await
        {
            tracing::error!(exchange = %context.exchange, error = %e, "exchange.declare failed");
        }
        if let Err(e) = context
            .broker
            .declare_exchange(&context.client_exchange, ExchangeKind::Fanout)
            .await
        {
            tracing::error!(exchange = %context.client_exchange, error = %e, "exchange.declare failed");
        }

        match context
            .broker
            .subscribe(&context.exchange, &context.inbound_key)
            .await
        {
            Ok(deliveries) => {
                let dispatcher = Arc::new(Dispatcher::new(context));
                tasks.push(tokio::spawn(consume(
                    dispatcher,
                    deliveries,
                    shutdown.clone(),
                )));
            }
            Err(e) => {
                tracing::error!(
                    routing_key = %context.inbound_key,
                    error = %e,
                    "Inbound subscription failed, worker messages will not be handled"
                );
            }
        }

        let reaper = Arc::new(HeartbeatReaper::new(
            context,
            Duration::from_secs(self.config.heartbeat.reap_interval_secs),
        ));
        tasks.push(supervise("heartbeat-reaper", shutdown.clone(), move |rx| {
            reaper.clone().run(rx)
        }));

        let reconciler = Arc::new(DeploymentReconciler::new(
            context,
            Duration::from_secs(self.config.deployments.reconcile_interval_secs),
        ));
        tasks.push(supervise("deployment-reconciler", shutdown, move |rx| {
            reconciler.clone().run(rx)
        }));

        tracing::info!("handler is initialized");
        tasks
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self.start(shutdown_rx).await;

        let state = AppState::new(self.context.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Overseer daemon listening on {}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("Overseer daemon shutting down");

        let _ = shutdown_tx.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task did not stop cleanly");
            }
        }

        served
    }
}

async fn open_stores(
    storage: &StorageConfig,
) -> (Arc<dyn WorkerStore>, Arc<dyn DeploymentStore>) {
    match storage {
        StorageConfig::Memory => {
            let registry = Arc::new(InMemoryRegistry::new());
            (
                registry.clone() as Arc<dyn WorkerStore>,
                registry as Arc<dyn DeploymentStore>,
            )
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => match PostgresRegistry::connect(url, *max_connections, *connect_timeout_secs).await {
            Ok(registry) => {
                tracing::info!("Connected to PostgreSQL registry");
                let registry = Arc::new(registry);
                (
                    registry.clone() as Arc<dyn WorkerStore>,
                    registry as Arc<dyn DeploymentStore>,
                )
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "PostgreSQL registry unavailable, running with in-memory registry"
                );
                let registry = Arc::new(InMemoryRegistry::new());
                (
                    registry.clone() as Arc<dyn WorkerStore>,
                    registry as Arc<dyn DeploymentStore>,
                )
            }
        },
    }
}

/// Hand each inbound delivery to the dispatcher on its own task
async fn consume(
    dispatcher: Arc<Dispatcher>,
    mut deliveries: crate::broker::DeliveryStream,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            delivery = deliveries.next() => match delivery {
                Some(delivery) => {
                    dispatcher.spawn_dispatch(delivery.body);
                }
                None => {
                    tracing::warn!("Inbound delivery stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
