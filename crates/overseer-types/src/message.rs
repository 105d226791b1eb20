//! Broker envelopes
//!
//! Inbound traffic arrives as an [`IncomingMessage`] in which exactly one of
//! `worker` or `monitor` is populated; [`Inbound`] is the decoded sum type.
//! Outbound traffic is a [`WorkerResponse`] addressed by worker `uuid`.

use crate::WorkerRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raw inbound envelope as it appears on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSample>,
}

/// Periodic resource usage sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSample {
    pub uuid: String,
    pub mem: u64,
    #[serde(default)]
    pub uptime: u64,
}

/// A decoded inbound message
#[derive(Debug, Clone)]
pub enum Inbound {
    Monitor(MonitorSample),
    Worker(WorkerRecord),
}

/// Reasons an inbound envelope is dropped
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("bad json incoming message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("incoming message carries neither a worker nor a monitor payload")]
    Empty,

    #[error("incoming message carries both a worker and a monitor payload")]
    Ambiguous,
}

impl Inbound {
    /// Decode a raw envelope into exactly one variant.
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        let message: IncomingMessage = serde_json::from_slice(data)?;
        Self::try_from(message)
    }
}

impl TryFrom<IncomingMessage> for Inbound {
    type Error = EnvelopeError;

    fn try_from(message: IncomingMessage) -> Result<Self, Self::Error> {
        match (message.worker, message.monitor) {
            (Some(worker), None) => Ok(Inbound::Worker(worker)),
            (None, Some(monitor)) => Ok(Inbound::Monitor(monitor)),
            (None, None) => Err(EnvelopeError::Empty),
            (Some(_), Some(_)) => Err(EnvelopeError::Ambiguous),
        }
    }
}

/// Admission decision sent back to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCommand {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "noPermission")]
    NoPermission,
}

impl fmt::Display for ResponseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCommand::Start => f.write_str("start"),
            ResponseCommand::NoPermission => f.write_str("noPermission"),
        }
    }
}

/// Outbound envelope `{name, uuid, command, log}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub name: String,
    pub uuid: String,
    pub command: ResponseCommand,
    /// Human-readable audit text, not meant to be parsed
    pub log: String,
}

impl WorkerResponse {
    pub fn start(worker: &WorkerRecord, log: impl Into<String>) -> Self {
        Self {
            name: worker.name.clone(),
            uuid: worker.uuid.clone(),
            command: ResponseCommand::Start,
            log: log.into(),
        }
    }

    pub fn no_permission(worker: &WorkerRecord, log: impl Into<String>) -> Self {
        Self {
            name: worker.name.clone(),
            uuid: worker.uuid.clone(),
            command: ResponseCommand::NoPermission,
            log: log.into(),
        }
    }

    pub fn is_start(&self) -> bool {
        self.command == ResponseCommand::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_worker_envelope() {
        let data = br#"{"worker":{"uuid":"A","name":"auth","version":13,"message":{"command":"add","option":"version"}}}"#;
        match Inbound::decode(data).unwrap() {
            Inbound::Worker(worker) => {
                assert_eq!(worker.uuid, "A");
                assert_eq!(worker.message.command, "add");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_monitor_envelope() {
        let data = br#"{"monitor":{"uuid":"A","mem":2048,"uptime":30}}"#;
        match Inbound::decode(data).unwrap() {
            Inbound::Monitor(sample) => {
                assert_eq!(sample.mem, 2048);
                assert_eq!(sample.uptime, 30);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = Inbound::decode(b"{not json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_empty_envelope() {
        let err = Inbound::decode(b"{}").unwrap_err();
        assert!(matches!(err, EnvelopeError::Empty));
    }

    #[test]
    fn test_decode_rejects_ambiguous_envelope() {
        let data = br#"{"worker":{"uuid":"A","name":"auth"},"monitor":{"uuid":"A","mem":1}}"#;
        let err = Inbound::decode(data).unwrap_err();
        assert!(matches!(err, EnvelopeError::Ambiguous));
    }

    #[test]
    fn test_response_wire_format() {
        let worker = WorkerRecord::new("B", "auth", 14);
        let response = WorkerResponse::no_permission(&worker, "blocked");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["name"], "auth");
        assert_eq!(json["uuid"], "B");
        assert_eq!(json["command"], "noPermission");
        assert_eq!(json["log"], "blocked");
    }
}
