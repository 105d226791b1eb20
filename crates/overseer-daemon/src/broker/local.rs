//! In-process broker backed by tokio broadcast channels

use super::{
    topic_matches, Broker, BrokerError, Delivery, DeliveryStream, ExchangeKind, Publication,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

const DEFAULT_CAPACITY: usize = 1024;

struct Exchange {
    kind: ExchangeKind,
    tx: broadcast::Sender<Delivery>,
}

/// In-process broker for single-node runs and tests.
///
/// Messages published while nobody is subscribed are dropped, the same as a
/// topic exchange with no bound queues.
pub struct LocalBroker {
    exchanges: DashMap<String, Exchange>,
    capacity: usize,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            exchanges: DashMap::new(),
            capacity,
        }
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        if let Some(existing) = self.exchanges.get(name) {
            if existing.kind != kind {
                return Err(BrokerError::KindMismatch {
                    name: name.to_string(),
                    existing: existing.kind,
                });
            }
            return Ok(());
        }

        let (tx, _) = broadcast::channel(self.capacity);
        self.exchanges
            .entry(name.to_string())
            .or_insert(Exchange { kind, tx });

        tracing::debug!(exchange = name, kind = %kind, "Exchange declared");
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publication: Publication,
    ) -> Result<(), BrokerError> {
        let tx = self
            .exchanges
            .get(exchange)
            .map(|e| e.tx.clone())
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;

        let delivery = Delivery {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: publication.content_type,
            body: publication.body,
        };

        // No receivers is not an error: the message is simply unroutable.
        let _ = tx.send(delivery);
        Ok(())
    }

    async fn subscribe(
        &self,
        exchange: &str,
        binding_key: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let (kind, rx) = self
            .exchanges
            .get(exchange)
            .map(|e| (e.kind, e.tx.subscribe()))
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;

        let binding_key = binding_key.to_string();
        let stream = stream::unfold((rx, binding_key), move |(mut rx, binding_key)| async move {
            loop {
                match rx.recv().await {
                    Ok(delivery) => {
                        if kind == ExchangeKind::Fanout
                            || topic_matches(&binding_key, &delivery.routing_key)
                        {
                            return Some((delivery, (rx, binding_key)));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            binding_key = %binding_key,
                            skipped = skipped,
                            "Subscriber lagged, deliveries dropped"
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}
