//! Worker lifecycle commands

use super::exclusive::ExclusivityEngine;
use super::publisher::ResponsePublisher;
use crate::context::{Context, HeartbeatSettings};
use crate::error::{HandlerError, HandlerResult};
use crate::proxy::{ProxyRegistry, ProxyRoute};
use chrono::Utc;
use overseer_registry::{RegistryError, WorkerPatch, WorkerStore};
use overseer_types::{ParseCommandError, WorkerCommand, WorkerRecord, WorkerResponse};
use std::sync::Arc;

/// What a processed command did
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// An admission decision was made and handed to the publisher
    Decided(WorkerResponse),
    /// Heartbeat refreshed an existing record
    Acknowledged,
    /// Heartbeat arrived for an unknown worker, which was registered again
    Reregistered,
    /// Process details refreshed
    Updated,
}

/// Interprets `add`, `addWithProxy`, `ack` and `update`
pub struct CommandProcessor {
    workers: Arc<dyn WorkerStore>,
    proxy: Arc<dyn ProxyRegistry>,
    proxy_service: String,
    heartbeat: HeartbeatSettings,
    engine: ExclusivityEngine,
    publisher: ResponsePublisher,
}

impl CommandProcessor {
    pub fn new(context: &Context) -> Self {
        Self {
            workers: context.workers.clone(),
            proxy: context.proxy.clone(),
            proxy_service: context.proxy_service.clone(),
            heartbeat: context.heartbeat,
            engine: ExclusivityEngine::new(context),
            publisher: ResponsePublisher::new(context),
        }
    }

    /// Run the command embedded in `worker.message`.
    pub async fn process(&self, worker: WorkerRecord) -> HandlerResult<CommandOutcome> {
        if worker.uuid.is_empty() {
            return Err(HandlerError::MissingUuid {
                name: worker.name.clone(),
            });
        }

        let command: WorkerCommand = worker
            .message
            .command
            .parse()
            .map_err(|e: ParseCommandError| HandlerError::UnrecognizedCommand(e.0))?;

        match command {
            WorkerCommand::Add | WorkerCommand::AddWithProxy => self.add(command, worker).await,
            WorkerCommand::Ack => self.ack(worker).await,
            WorkerCommand::Update => self.update(worker).await,
        }
    }

    async fn add(
        &self,
        command: WorkerCommand,
        worker: WorkerRecord,
    ) -> HandlerResult<CommandOutcome> {
        let response = self.engine.admit(worker.clone()).await?;
        self.publisher.publish_detached(response.clone());

        // Proxy failures are reported after the decision is already on its way.
        if command == WorkerCommand::AddWithProxy {
            self.register_route(&worker).await?;
        }

        Ok(CommandOutcome::Decided(response))
    }

    async fn register_route(&self, worker: &WorkerRecord) -> HandlerResult<()> {
        if worker.port == 0 {
            return Err(HandlerError::ProxyPortInvalid {
                name: worker.name.clone(),
            });
        }

        let route = ProxyRoute::for_worker(self.proxy_service.clone(), worker);
        self.proxy
            .upsert_route(route)
            .await
            .map_err(|e| HandlerError::ProxyRegistration(e.to_string()))
    }

    async fn ack(&self, worker: WorkerRecord) -> HandlerResult<CommandOutcome> {
        let deadline = self.heartbeat.deadline(Utc::now());

        match self
            .workers
            .update_one(&worker.uuid, WorkerPatch::heartbeat(deadline))
            .await
        {
            Ok(()) => Ok(CommandOutcome::Acknowledged),
            Err(RegistryError::WorkerNotFound(_)) => {
                let worker = worker.into_started(deadline);
                tracing::info!("{}", worker.audit_line("NOT REGISTERED, ADDING AGAIN"));
                self.workers.upsert(worker).await?;
                Ok(CommandOutcome::Reregistered)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, worker: WorkerRecord) -> HandlerResult<CommandOutcome> {
        tracing::info!("{}", worker.audit_line("UPDATE"));

        let deadline = self.heartbeat.deadline(Utc::now());
        let patch = WorkerPatch::heartbeat(deadline).with_process(worker.pid, worker.version);
        self.workers.update_one(&worker.uuid, patch).await?;

        Ok(CommandOutcome::Updated)
    }
}
