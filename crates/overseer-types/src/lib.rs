//! Overseer Types - Core types for the worker supervision layer
//!
//! Overseer decides whether a worker process reporting in over the message
//! broker is *permitted* to run, tracks how long each admitted worker is
//! considered alive, and garbage-collects stale registry state.
//!
//! ## Key Concepts
//!
//! - **WorkerRecord**: one registry entry per live worker, keyed by `uuid`
//! - **ExclusivityMode**: `one`, `version` or `many` admission policy
//! - **IncomingMessage**: the inbound envelope, either a command or a monitor sample
//! - **WorkerResponse**: the admission decision sent back to the worker
//! - **DeploymentInfo**: metadata describing a released build number

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod deployment;
pub mod ids;
pub mod message;
pub mod worker;

pub use deployment::DeploymentInfo;
pub use ids::RecordId;
pub use message::{
    EnvelopeError, Inbound, IncomingMessage, MonitorSample, ResponseCommand, WorkerResponse,
};
pub use worker::{
    normalize_name, ExclusivityMode, MonitorStats, ParseCommandError, ParseOptionError,
    WorkerCommand, WorkerMessage, WorkerRecord, WorkerStatus,
};
