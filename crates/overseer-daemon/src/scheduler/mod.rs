//! Background loops and their supervision
//!
//! Each loop runs on its own task under [`supervise`]. A panicking loop is
//! restarted after [`RESTART_BACKOFF`]; a loop that returns (because shutdown
//! was signalled) ends supervision.

pub mod reaper;
pub mod reconciler;

pub use reaper::{HeartbeatReaper, ReapReport};
pub use reconciler::{DeploymentReconciler, ReconcileReport};

use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Delay before a panicked loop is started again
pub const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Run `factory()` on a task and restart it whenever it panics.
pub fn supervise<F, Fut>(
    name: &'static str,
    mut shutdown: watch::Receiver<bool>,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u32 = 0;

        loop {
            let handle = tokio::spawn(factory(shutdown.clone()));

            match handle.await {
                Ok(()) => {
                    tracing::info!(task = name, "Background loop stopped");
                    break;
                }
                Err(e) if e.is_panic() => {
                    restarts += 1;
                    tracing::error!(
                        task = name,
                        restarts = restarts,
                        "Background loop panicked, restarting"
                    );
                }
                Err(e) => {
                    tracing::warn!(task = name, error = %e, "Background loop cancelled");
                    break;
                }
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(RESTART_BACKOFF) => {}
                _ = shutdown.changed() => break,
            }
        }
    })
}
