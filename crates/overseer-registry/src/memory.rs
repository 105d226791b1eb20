//! In-memory implementation of the store traits
//!
//! Suitable for development, tests and single-node deployments. Conditional
//! upserts hold the write lock across the conflict check and the insert.

use crate::error::{RegistryError, Result};
use crate::query::WorkerQuery;
use crate::store::{DeploymentStore, UpsertOutcome, WorkerPatch, WorkerStore, WorkerStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use overseer_types::{DeploymentInfo, WorkerRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory worker and deployment registry
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    workers: Arc<RwLock<HashMap<String, WorkerRecord>>>,
    deployments: DashMap<String, DeploymentInfo>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerStore for InMemoryRegistry {
    async fn find_one(&self, query: &WorkerQuery) -> Result<Option<WorkerRecord>> {
        if let WorkerQuery::Uuid(uuid) = query {
            return Ok(self.workers.read().await.get(uuid).cloned());
        }
        let workers = self.workers.read().await;
        Ok(workers.values().find(|w| query.matches(w)).cloned())
    }

    async fn find_all(&self, query: &WorkerQuery) -> Result<Vec<WorkerRecord>> {
        let workers = self.workers.read().await;
        let mut matched: Vec<_> = workers
            .values()
            .filter(|w| query.matches(w))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(matched)
    }

    async fn upsert(&self, worker: WorkerRecord) -> Result<()> {
        let mut workers = self.workers.write().await;
        workers.insert(worker.uuid.clone(), worker);
        Ok(())
    }

    async fn conditional_upsert(
        &self,
        conflict: &WorkerQuery,
        worker: WorkerRecord,
    ) -> Result<UpsertOutcome> {
        let mut workers = self.workers.write().await;
        if workers.values().any(|w| conflict.matches(w)) {
            return Ok(UpsertOutcome::Blocked);
        }
        workers.insert(worker.uuid.clone(), worker);
        Ok(UpsertOutcome::Inserted)
    }

    async fn update_one(&self, uuid: &str, patch: WorkerPatch) -> Result<()> {
        let mut workers = self.workers.write().await;
        match workers.get_mut(uuid) {
            Some(worker) => {
                patch.apply(worker);
                Ok(())
            }
            None => Err(RegistryError::WorkerNotFound(uuid.to_string())),
        }
    }

    async fn delete_stale(&self, uuid: &str, observed: DateTime<Utc>) -> Result<bool> {
        let mut workers = self.workers.write().await;
        match workers.get(uuid) {
            Some(worker) if worker.timestamp == observed => {
                workers.remove(uuid);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count(&self, query: &WorkerQuery) -> Result<u64> {
        let workers = self.workers.read().await;
        Ok(workers.values().filter(|w| query.matches(w)).count() as u64)
    }

    fn stream_all(&self) -> WorkerStream<'_> {
        let workers = self.workers.clone();
        stream::once(async move {
            let snapshot: Vec<WorkerRecord> = workers.read().await.values().cloned().collect();
            stream::iter(snapshot.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryRegistry {
    async fn list_deployments(&self) -> Result<Vec<DeploymentInfo>> {
        let mut deployments: Vec<_> = self.deployments.iter().map(|d| d.value().clone()).collect();
        deployments.sort_by(|a, b| a.build_number.cmp(&b.build_number));
        Ok(deployments)
    }

    async fn upsert_deployment(&self, deployment: DeploymentInfo) -> Result<()> {
        self.deployments
            .insert(deployment.build_number.clone(), deployment);
        Ok(())
    }

    async fn delete_deployment(&self, build_number: &str) -> Result<bool> {
        Ok(self.deployments.remove(build_number).is_some())
    }
}
