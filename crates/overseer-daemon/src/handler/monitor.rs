//! Resource usage samples

use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use overseer_registry::{RegistryError, WorkerPatch, WorkerStore};
use overseer_types::{MonitorSample, MonitorStats};
use std::sync::Arc;

/// Merges monitor samples into existing worker records.
///
/// Samples are not heartbeats; the deadline is left untouched.
pub struct MonitorUpdater {
    workers: Arc<dyn WorkerStore>,
}

impl MonitorUpdater {
    pub fn new(context: &Context) -> Self {
        Self {
            workers: context.workers.clone(),
        }
    }

    pub async fn apply(&self, sample: MonitorSample) -> HandlerResult<()> {
        let stats = MonitorStats {
            mem: sample.mem,
            uptime: sample.uptime,
        };

        match self
            .workers
            .update_one(&sample.uuid, WorkerPatch::monitor(stats))
            .await
        {
            Ok(()) => {
                tracing::trace!(uuid = %sample.uuid, mem = sample.mem, uptime = sample.uptime, "Monitor sample applied");
                Ok(())
            }
            Err(RegistryError::WorkerNotFound(uuid)) => Err(HandlerError::NotFound(uuid)),
            Err(e) => Err(e.into()),
        }
    }
}
