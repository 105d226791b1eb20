//! Admission decisions back to workers

use crate::broker::{Broker, Publication};
use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use overseer_types::WorkerResponse;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Publishes [`WorkerResponse`]s on `output.worker.<uuid>`
#[derive(Clone)]
pub struct ResponsePublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl ResponsePublisher {
    pub fn new(context: &Context) -> Self {
        Self {
            broker: context.broker.clone(),
            exchange: context.exchange.clone(),
        }
    }

    /// Serialize and publish one response.
    ///
    /// A response without a `uuid` has no addressable topic and is refused
    /// with [`HandlerError::MissingUuid`] before anything is sent.
    pub async fn publish(&self, response: &WorkerResponse) -> HandlerResult<()> {
        if response.uuid.is_empty() {
            return Err(HandlerError::MissingUuid {
                name: response.name.clone(),
            });
        }

        let body = serde_json::to_vec(response).map_err(HandlerError::Encode)?;
        let routing_key = Context::response_key(&response.uuid);

        self.broker
            .publish(&self.exchange, &routing_key, Publication::transient(body))
            .await?;

        tracing::debug!(
            uuid = %response.uuid,
            name = %response.name,
            command = %response.command,
            routing_key = %routing_key,
            "Response published"
        );
        Ok(())
    }

    /// Publish on a detached task; failures are logged and never retried.
    pub fn publish_detached(&self, response: WorkerResponse) -> JoinHandle<()> {
        let publisher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&response).await {
                tracing::error!(
                    uuid = %response.uuid,
                    name = %response.name,
                    error = %e,
                    "can't send response to worker"
                );
            }
        })
    }
}
