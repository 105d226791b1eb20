//! Store trait definitions
//!
//! The worker store is the single arbiter of concurrent admission attempts:
//! every mutation is one self-contained atomic operation scoped to one record
//! or one predicate.

use crate::error::Result;
use crate::query::WorkerQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use overseer_types::{DeploymentInfo, MonitorStats, WorkerRecord, WorkerStatus};

/// Lazy sequence of every stored worker record
pub type WorkerStream<'a> = BoxStream<'a, Result<WorkerRecord>>;

/// Outcome of a conditional upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record matched the conflict predicate; the candidate was stored
    Inserted,
    /// A conflicting record exists; nothing was written
    Blocked,
}

impl UpsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

/// Partial update applied to one record by `uuid`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerPatch {
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<WorkerStatus>,
    pub pid: Option<u32>,
    pub version: Option<i64>,
    pub monitor: Option<MonitorStats>,
}

impl WorkerPatch {
    /// Heartbeat refresh: new deadline, status `Started`.
    pub fn heartbeat(deadline: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(deadline),
            status: Some(WorkerStatus::Started),
            ..Default::default()
        }
    }

    pub fn with_process(mut self, pid: u32, version: i64) -> Self {
        self.pid = Some(pid);
        self.version = Some(version);
        self
    }

    pub fn monitor(stats: MonitorStats) -> Self {
        Self {
            monitor: Some(stats),
            ..Default::default()
        }
    }

    pub fn apply(&self, worker: &mut WorkerRecord) {
        if let Some(timestamp) = self.timestamp {
            worker.timestamp = timestamp;
        }
        if let Some(status) = self.status {
            worker.status = status;
        }
        if let Some(pid) = self.pid {
            worker.pid = pid;
        }
        if let Some(version) = self.version {
            worker.version = version;
        }
        if let Some(monitor) = self.monitor {
            worker.monitor = monitor;
        }
    }
}

/// Storage for live worker records
#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// Get the first record matching a predicate
    async fn find_one(&self, query: &WorkerQuery) -> Result<Option<WorkerRecord>>;

    /// List every record matching a predicate
    async fn find_all(&self, query: &WorkerQuery) -> Result<Vec<WorkerRecord>>;

    /// Create or replace the record for `worker.uuid`
    async fn upsert(&self, worker: WorkerRecord) -> Result<()>;

    /// Atomically store `worker` only if no record matches `conflict`
    async fn conditional_upsert(
        &self,
        conflict: &WorkerQuery,
        worker: WorkerRecord,
    ) -> Result<UpsertOutcome>;

    /// Patch the record for `uuid`, failing with `WorkerNotFound` if absent
    async fn update_one(&self, uuid: &str, patch: WorkerPatch) -> Result<()>;

    /// Delete the record for `uuid` only while its deadline is still `observed`.
    ///
    /// A heartbeat or re-admission that moved the deadline after the caller
    /// read the record leaves it in place and returns `false`.
    async fn delete_stale(&self, uuid: &str, observed: DateTime<Utc>) -> Result<bool>;

    /// Count records matching a predicate
    async fn count(&self, query: &WorkerQuery) -> Result<u64>;

    /// Stream every stored record
    fn stream_all(&self) -> WorkerStream<'_>;
}

/// Storage for deployment metadata
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// List all deployments
    async fn list_deployments(&self) -> Result<Vec<DeploymentInfo>>;

    /// Create or update a deployment
    async fn upsert_deployment(&self, deployment: DeploymentInfo) -> Result<()>;

    /// Delete a deployment by build number
    async fn delete_deployment(&self, build_number: &str) -> Result<bool>;
}
