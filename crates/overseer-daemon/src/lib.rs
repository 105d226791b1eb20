//! Overseer Daemon library
//!
//! This module provides the core components of the supervision daemon:
//! - Message dispatch, admission control and heartbeat handling
//! - Broker and proxy-registration contracts with in-process implementations
//! - Heartbeat reaping and deployment reconciliation loops
//! - REST API and server lifecycle management

pub mod api;
pub mod broker;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod scheduler;
pub mod server;

pub use broker::{Broker, LocalBroker};
pub use config::DaemonConfig;
pub use context::{Context, HeartbeatSettings};
pub use error::{ApiError, DaemonError, DaemonResult, HandlerError, HandlerResult};
pub use handler::Dispatcher;
pub use proxy::{InMemoryProxyRegistry, ProxyRegistry};
pub use server::Server;
