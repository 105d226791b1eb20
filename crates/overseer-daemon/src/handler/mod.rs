//! Inbound message handling
//!
//! The [`Dispatcher`] decodes one raw envelope and hands it to exactly one of
//! the [`MonitorUpdater`] or the [`CommandProcessor`].

pub mod command;
pub mod exclusive;
pub mod monitor;
pub mod publisher;

pub use command::{CommandOutcome, CommandProcessor};
pub use exclusive::ExclusivityEngine;
pub use monitor::MonitorUpdater;
pub use publisher::ResponsePublisher;

use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use overseer_types::Inbound;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of dispatching one envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A monitor sample was applied to the named worker
    Monitor { uuid: String },
    /// A worker command was processed
    Command(CommandOutcome),
}

/// Routes decoded envelopes to their handler
pub struct Dispatcher {
    monitor: MonitorUpdater,
    commands: CommandProcessor,
}

impl Dispatcher {
    pub fn new(context: &Context) -> Self {
        Self {
            monitor: MonitorUpdater::new(context),
            commands: CommandProcessor::new(context),
        }
    }

    /// Decode and handle one envelope.
    pub async fn dispatch(&self, data: &[u8]) -> HandlerResult<Dispatched> {
        match Inbound::decode(data)? {
            Inbound::Monitor(sample) => {
                let uuid = sample.uuid.clone();
                self.monitor.apply(sample).await?;
                Ok(Dispatched::Monitor { uuid })
            }
            Inbound::Worker(worker) => {
                let outcome = self.commands.process(worker).await?;
                Ok(Dispatched::Command(outcome))
            }
        }
    }

    /// Handle one envelope on its own task, logging any failure.
    pub fn spawn_dispatch(self: &Arc<Self>, data: Vec<u8>) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(&data).await {
                Ok(_) => {}
                Err(HandlerError::SchemaViolation(reason)) => {
                    tracing::warn!(
                        body = %String::from_utf8_lossy(&data),
                        reason = %reason,
                        "incoming message is in wrong format"
                    );
                }
                Err(e @ HandlerError::Decode(_)) => {
                    tracing::error!(
                        body = %String::from_utf8_lossy(&data),
                        error = %e,
                        "Dropping undecodable message"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Message handling failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use overseer_registry::WorkerQuery;

    fn dispatcher() -> (Context, Dispatcher) {
        let context = Context::in_memory(&DaemonConfig::default());
        let dispatcher = Dispatcher::new(&context);
        (context, dispatcher)
    }

    #[tokio::test]
    async fn test_worker_envelope_reaches_command_processor() {
        let (context, dispatcher) = dispatcher();
        let data = br#"{"worker":{"uuid":"A","name":"auth","version":13,"message":{"command":"ack","option":""}}}"#;

        let dispatched = dispatcher.dispatch(data).await.unwrap();

        assert_eq!(
            dispatched,
            Dispatched::Command(CommandOutcome::Reregistered)
        );
        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_monitor_envelope_reaches_updater() {
        let (_context, dispatcher) = dispatcher();
        dispatcher
            .dispatch(br#"{"worker":{"uuid":"A","name":"auth","message":{"command":"ack"}}}"#)
            .await
            .unwrap();

        let dispatched = dispatcher
            .dispatch(br#"{"monitor":{"uuid":"A","mem":512,"uptime":9}}"#)
            .await
            .unwrap();

        assert_eq!(
            dispatched,
            Dispatched::Monitor {
                uuid: "A".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_and_empty_envelopes() {
        let (context, dispatcher) = dispatcher();

        assert!(matches!(
            dispatcher.dispatch(b"not json").await,
            Err(HandlerError::Decode(_))
        ));
        assert!(matches!(
            dispatcher.dispatch(b"{}").await,
            Err(HandlerError::SchemaViolation(_))
        ));
        assert_eq!(context.workers.count(&WorkerQuery::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_dispatch_survives_errors() {
        let (_context, dispatcher) = dispatcher();
        let dispatcher = Arc::new(dispatcher);

        dispatcher
            .spawn_dispatch(b"garbage".to_vec())
            .await
            .unwrap();
        dispatcher.spawn_dispatch(b"{}".to_vec()).await.unwrap();
    }
}
