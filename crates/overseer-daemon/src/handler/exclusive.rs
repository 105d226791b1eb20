//! Admission policies for `add`
//!
//! `one` and `version` are decided by a single atomic conditional upsert
//! against the worker store. The follow-up read of the blocking worker only
//! feeds the response log and never changes the decision.

use crate::context::{Context, HeartbeatSettings};
use crate::error::{HandlerError, HandlerResult};
use chrono::Utc;
use overseer_registry::{UpsertOutcome, WorkerQuery, WorkerStore};
use overseer_types::{ExclusivityMode, WorkerRecord, WorkerResponse};
use std::sync::Arc;

const SAME_NAME_REASON: &str = "workers with the same name running: ";
const OTHER_VERSION_REASON: &str = "workers with different name and versions running: ";

/// Decides whether a candidate worker may start
pub struct ExclusivityEngine {
    workers: Arc<dyn WorkerStore>,
    heartbeat: HeartbeatSettings,
}

impl ExclusivityEngine {
    pub fn new(context: &Context) -> Self {
        Self {
            workers: context.workers.clone(),
            heartbeat: context.heartbeat,
        }
    }

    /// Admit or refuse `candidate` according to `candidate.message.option`.
    ///
    /// Returns an error only for an unknown option; every defined mode yields
    /// a response, including when the store fails.
    pub async fn admit(&self, candidate: WorkerRecord) -> HandlerResult<WorkerResponse> {
        let mode: ExclusivityMode = candidate
            .message
            .option
            .parse()
            .map_err(|e: overseer_types::ParseOptionError| HandlerError::UnknownOption(e.0))?;

        let worker = candidate.into_started(self.heartbeat.deadline(Utc::now()));

        let response = match mode {
            ExclusivityMode::Many => self.admit_many(worker).await,
            ExclusivityMode::One => {
                let conflict = WorkerQuery::same_name(worker.name.clone());
                self.admit_exclusive(conflict, worker, SAME_NAME_REASON)
                    .await
            }
            ExclusivityMode::Version => {
                let conflict = WorkerQuery::other_version_of(&worker);
                self.admit_exclusive(conflict, worker, OTHER_VERSION_REASON)
                    .await
            }
        };

        Ok(response)
    }

    async fn admit_many(&self, worker: WorkerRecord) -> WorkerResponse {
        let log = worker.audit_line("START");
        tracing::info!("{}", log);

        // The worker starts regardless; its next ack re-registers it.
        if let Err(e) = self.workers.upsert(worker.clone()).await {
            tracing::error!(
                uuid = %worker.uuid,
                name = %worker.name,
                error = %e,
                "Failed to register worker"
            );
        }

        WorkerResponse::start(&worker, log)
    }

    async fn admit_exclusive(
        &self,
        conflict: WorkerQuery,
        worker: WorkerRecord,
        reason: &str,
    ) -> WorkerResponse {
        match self.workers.conditional_upsert(&conflict, worker.clone()).await {
            Ok(UpsertOutcome::Inserted) => {
                let log = worker.audit_line("START");
                tracing::info!("{}", log);
                WorkerResponse::start(&worker, log)
            }
            Ok(UpsertOutcome::Blocked) => {
                let log = self.describe_conflict(&conflict, reason).await;
                tracing::info!(
                    uuid = %worker.uuid,
                    name = %worker.name,
                    version = worker.version,
                    "{}",
                    log
                );
                WorkerResponse::no_permission(&worker, log)
            }
            Err(e) => {
                tracing::error!(
                    uuid = %worker.uuid,
                    name = %worker.name,
                    error = %e,
                    "Admission check failed"
                );
                WorkerResponse::no_permission(&worker, format!("admission check failed: {}", e))
            }
        }
    }

    async fn describe_conflict(&self, conflict: &WorkerQuery, reason: &str) -> String {
        match self.workers.find_one(conflict).await {
            Ok(Some(alive)) => format!(
                "{}version: {} (pid: {}) at {}",
                reason, alive.version, alive.pid, alive.hostname
            ),
            Ok(None) => format!("{}conflicting worker is no longer registered", reason),
            Err(e) => format!("{}conflicting worker could not be read: {}", reason, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use async_trait::async_trait;
    use chrono::DateTime;
    use futures_util::{stream, StreamExt};
    use overseer_registry::{
        InMemoryRegistry, RegistryError, Result, WorkerPatch, WorkerStream,
    };
    use overseer_types::{ResponseCommand, WorkerStatus};

    #[derive(Clone, Copy)]
    enum Failure {
        /// Every write fails
        Down,
        /// Admission is blocked, but the blocking worker is gone by the time it is read
        ConflictVanished,
        /// Admission is blocked and the blocking worker cannot be read
        ConflictUnreadable,
    }

    struct FailingStore {
        failure: Failure,
    }

    fn unavailable() -> RegistryError {
        RegistryError::Connection("registry offline".to_string())
    }

    #[async_trait]
    impl WorkerStore for FailingStore {
        async fn find_one(&self, _query: &WorkerQuery) -> Result<Option<WorkerRecord>> {
            match self.failure {
                Failure::ConflictUnreadable => Err(unavailable()),
                _ => Ok(None),
            }
        }

        async fn find_all(&self, _query: &WorkerQuery) -> Result<Vec<WorkerRecord>> {
            Ok(Vec::new())
        }

        async fn upsert(&self, _worker: WorkerRecord) -> Result<()> {
            Err(unavailable())
        }

        async fn conditional_upsert(
            &self,
            _conflict: &WorkerQuery,
            _worker: WorkerRecord,
        ) -> Result<UpsertOutcome> {
            match self.failure {
                Failure::Down => Err(unavailable()),
                Failure::ConflictVanished | Failure::ConflictUnreadable => {
                    Ok(UpsertOutcome::Blocked)
                }
            }
        }

        async fn update_one(&self, uuid: &str, _patch: WorkerPatch) -> Result<()> {
            Err(RegistryError::WorkerNotFound(uuid.to_string()))
        }

        async fn delete_stale(&self, _uuid: &str, _observed: DateTime<Utc>) -> Result<bool> {
            Ok(false)
        }

        async fn count(&self, _query: &WorkerQuery) -> Result<u64> {
            Ok(0)
        }

        fn stream_all(&self) -> WorkerStream<'_> {
            stream::empty().boxed()
        }
    }

    fn engine() -> (Context, ExclusivityEngine) {
        let context = Context::in_memory(&DaemonConfig::default());
        let engine = ExclusivityEngine::new(&context);
        (context, engine)
    }

    fn failing_engine(failure: Failure) -> ExclusivityEngine {
        let context = Context::new(
            &DaemonConfig::default(),
            Arc::new(FailingStore { failure }),
            Arc::new(InMemoryRegistry::new()),
            Arc::new(crate::broker::LocalBroker::new()),
            Arc::new(crate::proxy::InMemoryProxyRegistry::new()),
        );
        ExclusivityEngine::new(&context)
    }

    fn candidate(uuid: &str, name: &str, version: i64, option: &str) -> WorkerRecord {
        WorkerRecord::new(uuid, name, version)
            .with_message("add", option)
            .with_host("web-1", 4000)
            .with_pid(42)
    }

    #[tokio::test]
    async fn test_many_always_starts() {
        let (context, engine) = engine();

        for uuid in ["A", "B", "C"] {
            let response = engine
                .admit(candidate(uuid, "mailer", 1, "many"))
                .await
                .unwrap();
            assert!(response.is_start());
        }

        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_one_blocks_same_name() {
        let (context, engine) = engine();

        let first = engine.admit(candidate("A", "mailer", 1, "one")).await.unwrap();
        let second = engine.admit(candidate("B", "mailer", 1, "one")).await.unwrap();

        assert!(first.is_start());
        assert_eq!(second.command, ResponseCommand::NoPermission);
        assert_eq!(
            second.log,
            "workers with the same name running: version: 1 (pid: 42) at web-1"
        );
        assert!(context
            .workers
            .find_one(&WorkerQuery::Uuid("B".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_one_allows_other_names() {
        let (_context, engine) = engine();

        engine.admit(candidate("A", "mailer", 1, "one")).await.unwrap();
        let response = engine.admit(candidate("B", "auth", 1, "one")).await.unwrap();
        assert!(response.is_start());
    }

    #[tokio::test]
    async fn test_version_allows_same_version_and_blocks_others() {
        let (_context, engine) = engine();

        let a = engine.admit(candidate("A", "auth", 13, "version")).await.unwrap();
        let b = engine.admit(candidate("B", "auth", 13, "version")).await.unwrap();
        let c = engine.admit(candidate("C", "auth-2", 14, "version")).await.unwrap();

        assert!(a.is_start());
        assert!(b.is_start());
        assert_eq!(c.command, ResponseCommand::NoPermission);
        assert!(c.log.starts_with(OTHER_VERSION_REASON));
        assert!(c.log.contains("version: 13"));
    }

    #[tokio::test]
    async fn test_admitted_record_is_started_with_deadline() {
        let (context, engine) = engine();
        let before = Utc::now();

        engine.admit(candidate("A", "auth", 13, "version")).await.unwrap();

        let stored = context
            .workers
            .find_one(&WorkerQuery::Uuid("A".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, WorkerStatus::Started);
        assert!(stored.timestamp >= before + context.heartbeat.interval);
    }

    #[tokio::test]
    async fn test_unknown_option_is_an_error() {
        let (context, engine) = engine();

        let err = engine
            .admit(candidate("A", "auth", 13, "all"))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::UnknownOption(ref option) if option == "all"));
        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_one_has_single_winner() {
        let (context, _) = engine();
        let engine = Arc::new(ExclusivityEngine::new(&context));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .admit(candidate(&format!("w{}", i), "billing", 1, "one"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap().is_start() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_store_failure_refuses_exclusive_modes() {
        let engine = failing_engine(Failure::Down);

        for option in ["one", "version"] {
            let response = engine
                .admit(candidate("A", "auth", 13, option))
                .await
                .unwrap();
            assert_eq!(response.uuid, "A");
            assert_eq!(response.command, ResponseCommand::NoPermission);
            assert_eq!(
                response.log,
                "admission check failed: Connection error: registry offline"
            );
        }
    }

    #[tokio::test]
    async fn test_store_failure_still_starts_many() {
        let engine = failing_engine(Failure::Down);

        let response = engine
            .admit(candidate("A", "resize", 7, "many"))
            .await
            .unwrap();

        assert!(response.is_start());
        assert!(response.log.contains("START"));
    }

    #[tokio::test]
    async fn test_vanished_conflict_is_reported() {
        let engine = failing_engine(Failure::ConflictVanished);

        let response = engine
            .admit(candidate("B", "mailer", 1, "one"))
            .await
            .unwrap();

        assert_eq!(response.command, ResponseCommand::NoPermission);
        assert_eq!(
            response.log,
            "workers with the same name running: conflicting worker is no longer registered"
        );
    }

    #[tokio::test]
    async fn test_unreadable_conflict_is_reported() {
        let engine = failing_engine(Failure::ConflictUnreadable);

        let response = engine
            .admit(candidate("C", "auth-2", 14, "version"))
            .await
            .unwrap();

        assert_eq!(response.command, ResponseCommand::NoPermission);
        assert_eq!(
            response.log,
            "workers with different name and versions running: \
             conflicting worker could not be read: Connection error: registry offline"
        );
    }
}
