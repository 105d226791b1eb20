//! Overseer Registry - Worker registry store contracts and implementations
//!
//! This crate provides the storage contract the supervision daemon is built on:
//!
//! - **WorkerStore**: one record per live worker, with an atomic
//!   conditional upsert used for admission control
//! - **DeploymentStore**: build metadata reconciled against live workers
//! - **WorkerQuery**: the closed set of predicates every backend understands
//!
//! ## In-Memory vs Persistent
//!
//! [`InMemoryRegistry`] is suitable for development, testing and single-node
//! runs. [`PostgresRegistry`] persists the registry so several daemons can
//! share it; its conditional upsert serializes through a table lock.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

// Re-exports
pub use error::{RegistryError, Result};
pub use memory::InMemoryRegistry;
pub use postgres::PostgresRegistry;
pub use query::WorkerQuery;
pub use store::{DeploymentStore, UpsertOutcome, WorkerPatch, WorkerStore, WorkerStream};
