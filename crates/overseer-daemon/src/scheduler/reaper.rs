//! Heartbeat reaper
//!
//! A worker whose deadline has passed is tolerated for one grace window and
//! deleted once that window has also passed.

use crate::context::Context;
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use overseer_registry::WorkerStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Summary of one reaping cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    /// Past their deadline, evicted or not
    pub overdue: usize,
    pub evicted: usize,
}

/// Evicts workers that stopped heartbeating
pub struct HeartbeatReaper {
    workers: Arc<dyn WorkerStore>,
    grace: Duration,
    period: std::time::Duration,
}

impl HeartbeatReaper {
    pub fn new(context: &Context, period: std::time::Duration) -> Self {
        Self {
            workers: context.workers.clone(),
            grace: context.heartbeat.grace,
            period,
        }
    }

    /// Scan every record once against `now`.
    ///
    /// Evictions are keyed on the deadline seen during the scan, so a worker
    /// that heartbeats before its delete lands is kept.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> ReapReport {
        let mut report = ReapReport::default();
        let mut dead = Vec::new();

        {
            let mut stream = self.workers.stream_all();
            while let Some(item) = stream.next().await {
                let worker = match item {
                    Ok(worker) => worker,
                    Err(e) => {
                        tracing::error!(error = %e, "Worker scan aborted");
                        break;
                    }
                };
                report.scanned += 1;

                if now < worker.timestamp {
                    continue;
                }
                report.overdue += 1;
                tracing::info!("{}", worker.audit_line("NO HEARTBEAT"));

                if now < worker.timestamp + self.grace {
                    continue;
                }
                tracing::info!("{}", worker.audit_line("DEAD"));
                dead.push((worker.uuid, worker.timestamp));
            }
        }

        for (uuid, observed) in dead {
            match self.workers.delete_stale(&uuid, observed).await {
                Ok(true) => report.evicted += 1,
                Ok(false) => tracing::debug!(uuid = %uuid, "Worker refreshed before eviction"),
                Err(e) => tracing::error!(uuid = %uuid, error = %e, "Failed to evict worker"),
            }
        }

        report
    }

    /// Reap on a fixed period until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_ms = self.period.as_millis() as u64, "Heartbeat reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle(Utc::now()).await;
                    if report.evicted > 0 {
                        tracing::debug!(
                            scanned = report.scanned,
                            evicted = report.evicted,
                            "Reaping cycle complete"
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::proxy::InMemoryProxyRegistry;
    use async_trait::async_trait;
    use futures_util::stream;
    use overseer_registry::{
        InMemoryRegistry, Result, UpsertOutcome, WorkerPatch, WorkerQuery, WorkerStream,
    };
    use overseer_types::WorkerRecord;

    /// Worker store whose scan snapshot goes stale: the listed worker
    /// heartbeats after the snapshot is taken and before it is yielded.
    struct HeartbeatDuringScan {
        inner: Arc<InMemoryRegistry>,
        uuid: String,
        deadline: DateTime<Utc>,
    }

    #[async_trait]
    impl WorkerStore for HeartbeatDuringScan {
        async fn find_one(&self, query: &WorkerQuery) -> Result<Option<WorkerRecord>> {
            self.inner.find_one(query).await
        }

        async fn find_all(&self, query: &WorkerQuery) -> Result<Vec<WorkerRecord>> {
            self.inner.find_all(query).await
        }

        async fn upsert(&self, worker: WorkerRecord) -> Result<()> {
            self.inner.upsert(worker).await
        }

        async fn conditional_upsert(
            &self,
            conflict: &WorkerQuery,
            worker: WorkerRecord,
        ) -> Result<UpsertOutcome> {
            self.inner.conditional_upsert(conflict, worker).await
        }

        async fn update_one(&self, uuid: &str, patch: WorkerPatch) -> Result<()> {
            self.inner.update_one(uuid, patch).await
        }

        async fn delete_stale(&self, uuid: &str, observed: DateTime<Utc>) -> Result<bool> {
            self.inner.delete_stale(uuid, observed).await
        }

        async fn count(&self, query: &WorkerQuery) -> Result<u64> {
            self.inner.count(query).await
        }

        fn stream_all(&self) -> WorkerStream<'_> {
            stream::once(async move {
                let snapshot = match self.inner.find_all(&WorkerQuery::All).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => return stream::iter(vec![Err(e)]),
                };
                if let Err(e) = self
                    .inner
                    .update_one(&self.uuid, WorkerPatch::heartbeat(self.deadline))
                    .await
                {
                    return stream::iter(vec![Err(e)]);
                }
                stream::iter(snapshot.into_iter().map(Ok).collect::<Vec<_>>())
            })
            .flatten()
            .boxed()
        }
    }

    async fn seed(context: &Context, uuid: &str, deadline: DateTime<Utc>) {
        context
            .workers
            .upsert(WorkerRecord::new(uuid, "auth", 1).into_started(deadline))
            .await
            .unwrap();
    }

    fn reaper(context: &Context) -> HeartbeatReaper {
        HeartbeatReaper::new(context, std::time::Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_live_worker_is_kept() {
        let context = Context::in_memory(&DaemonConfig::default());
        let now = Utc::now();
        seed(&context, "A", now + Duration::seconds(5)).await;

        let report = reaper(&context).run_cycle(now).await;

        assert_eq!(
            report,
            ReapReport {
                scanned: 1,
                overdue: 0,
                evicted: 0
            }
        );
    }

    #[tokio::test]
    async fn test_missed_beat_within_grace_is_kept() {
        let context = Context::in_memory(&DaemonConfig::default());
        let now = Utc::now();
        seed(&context, "A", now - Duration::seconds(3)).await;

        let report = reaper(&context).run_cycle(now).await;

        assert_eq!(report.overdue, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_worker_past_grace_is_evicted_once() {
        let context = Context::in_memory(&DaemonConfig::default());
        let now = Utc::now();
        seed(&context, "A", now - Duration::seconds(6)).await;
        seed(&context, "B", now + Duration::seconds(6)).await;
        let reaper = reaper(&context);

        let first = reaper.run_cycle(now).await;
        let second = reaper.run_cycle(now).await;

        assert_eq!(first.evicted, 1);
        assert_eq!(second.evicted, 0);
        assert!(context
            .workers
            .find_one(&WorkerQuery::Uuid("A".into()))
            .await
            .unwrap()
            .is_none());
        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_worker_refreshed_during_scan_is_kept() {
        let config = DaemonConfig::default();
        let now = Utc::now();
        let registry = Arc::new(InMemoryRegistry::new());
        let store = Arc::new(HeartbeatDuringScan {
            inner: registry.clone(),
            uuid: "A".to_string(),
            deadline: now + Duration::seconds(10),
        });
        let context = Context::new(
            &config,
            store,
            registry.clone(),
            Arc::new(crate::broker::LocalBroker::new()),
            Arc::new(InMemoryProxyRegistry::new()),
        );
        seed(&context, "A", now - Duration::seconds(6)).await;
        seed(&context, "B", now - Duration::seconds(6)).await;

        let report = reaper(&context).run_cycle(now).await;

        assert_eq!(report.overdue, 2);
        assert_eq!(report.evicted, 1);
        let survivor = registry
            .find_one(&WorkerQuery::Uuid("A".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(survivor.timestamp, now + Duration::seconds(10));
        assert!(registry
            .find_one(&WorkerQuery::Uuid("B".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let context = Context::in_memory(&DaemonConfig::default());
        let reaper = Arc::new(reaper(&context));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reaper.run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
