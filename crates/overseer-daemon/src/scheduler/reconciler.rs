//! Deployment reconciliation loop

use crate::context::Context;
use overseer_registry::{DeploymentStore, RegistryError, WorkerQuery, WorkerStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub removed: usize,
    /// Deployments whose build number is not an integer, or whose count failed
    pub skipped: usize,
}

/// Removes deployment metadata once no started worker of that build remains
pub struct DeploymentReconciler {
    workers: Arc<dyn WorkerStore>,
    deployments: Arc<dyn DeploymentStore>,
    period: Duration,
}

impl DeploymentReconciler {
    pub fn new(context: &Context, period: Duration) -> Self {
        Self {
            workers: context.workers.clone(),
            deployments: context.deployments.clone(),
            period,
        }
    }

    /// Examine every deployment once.
    ///
    /// The count and the delete are separate store calls; a worker admitted
    /// in between leaves a dangling entry until the next cycle.
    pub async fn run_cycle(&self) -> Result<ReconcileReport, RegistryError> {
        let mut report = ReconcileReport::default();
        let deployments = self.deployments.list_deployments().await?;

        for deployment in deployments {
            report.examined += 1;

            let Some(version) = deployment.version() else {
                tracing::warn!(
                    build_number = %deployment.build_number,
                    "Skipping deployment with non-numeric build number"
                );
                report.skipped += 1;
                continue;
            };

            let running = match self
                .workers
                .count(&WorkerQuery::StartedWithVersion(version))
                .await
            {
                Ok(running) => running,
                Err(e) => {
                    tracing::error!(
                        build_number = %deployment.build_number,
                        error = %e,
                        "Failed to count workers"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            if running > 0 {
                continue;
            }

            tracing::info!(
                "removing deployment info for build number {}",
                deployment.build_number
            );
            match self
                .deployments
                .delete_deployment(&deployment.build_number)
                .await
            {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    build_number = %deployment.build_number,
                    error = %e,
                    "Failed to remove deployment"
                ),
            }
        }

        Ok(report)
    }

    /// Reconcile on a fixed period until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("Cleaner started to remove unused deployments");
                    match self.run_cycle().await {
                        Ok(report) => tracing::info!(
                            examined = report.examined,
                            removed = report.removed,
                            skipped = report.skipped,
                            "Reconciliation complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "Reconciliation failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
