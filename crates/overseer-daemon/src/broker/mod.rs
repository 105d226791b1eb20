//! Message broker boundary
//!
//! The daemon only needs three things from a publish/subscribe broker:
//! declare an exchange, publish to a routing key, and consume deliveries
//! matching a binding key. Adapters are responsible only for delivery
//! mechanics; [`LocalBroker`] is the in-process implementation.

mod local;

pub use local::LocalBroker;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;
use thiserror::Error;

/// Exchange routing behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Route by dotted routing key with `*` / `#` wildcards
    Topic,
    /// Deliver to every subscriber regardless of key
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Topic => f.write_str("topic"),
            ExchangeKind::Fanout => f.write_str("fanout"),
        }
    }
}

/// A message to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub body: Vec<u8>,
    pub content_type: String,
    /// Whether the broker must keep the message across restarts
    pub persistent: bool,
    /// 0-9, 0 is the default priority
    pub priority: u8,
}

impl Publication {
    /// Plain-text, non-persistent, default-priority message.
    pub fn transient(body: Vec<u8>) -> Self {
        Self {
            body,
            content_type: "text/plain".to_string(),
            persistent: false,
            priority: 0,
        }
    }
}

/// A message received from a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Stream of deliveries for one subscription
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("exchange '{0}' is not declared")]
    UnknownExchange(String),

    #[error("exchange '{name}' already declared as {existing}")]
    KindMismatch { name: String, existing: ExchangeKind },
}

/// Publish/subscribe broker contract
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare an exchange; declaring an existing exchange with the same kind is a no-op
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError>;

    /// Publish one message
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publication: Publication,
    ) -> Result<(), BrokerError>;

    /// Consume deliveries whose routing key matches `binding_key`
    async fn subscribe(&self, exchange: &str, binding_key: &str)
        -> Result<DeliveryStream, BrokerError>;
}

/// Topic-exchange matching: `*` matches exactly one word, `#` zero or more.
pub fn topic_matches(binding_key: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = binding_key.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| match_words(rest, &words[skip..])),
        Some((&head, rest)) => match words.split_first() {
            Some((&word, remaining)) if head == "*" || head == word => {
                match_words(rest, remaining)
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_topic_match() {
        assert!(topic_matches("input.worker", "input.worker"));
        assert!(!topic_matches("input.worker", "input.monitor"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("output.worker.*", "output.worker.A"));
        assert!(!topic_matches("output.worker.*", "output.worker"));
        assert!(!topic_matches("output.*", "output.worker.A"));
    }

    #[test]
    fn test_hash_matches_any_suffix() {
        assert!(topic_matches("output.#", "output.worker.A"));
        assert!(topic_matches("output.#", "output"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("output.#.A", "output.worker.A"));
        assert!(!topic_matches("output.#", "input.worker"));
    }

    #[test]
    fn test_transient_publication_defaults() {
        let publication = Publication::transient(b"{}".to_vec());
        assert_eq!(publication.content_type, "text/plain");
        assert!(!publication.persistent);
        assert_eq!(publication.priority, 0);
    }
}
