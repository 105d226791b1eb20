//! Worker registry records
//!
//! A [`WorkerRecord`] is both the candidate a worker sends on the wire and the
//! durable registry entry the daemon stores for it once admitted.

use crate::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One registry entry per live worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Identity marker of this stored incarnation
    #[serde(default)]
    pub id: RecordId,

    /// Unique identity supplied by the worker
    #[serde(default)]
    pub uuid: String,

    /// Logical worker name (e.g. `auth`, `mailer-3`)
    pub name: String,

    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub environment: String,

    /// Build number the worker was started from
    #[serde(default)]
    pub version: i64,

    #[serde(default)]
    pub pid: u32,

    #[serde(default)]
    pub status: WorkerStatus,

    /// Next expected heartbeat deadline
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Latest resource usage sample
    #[serde(default)]
    pub monitor: MonitorStats,

    /// Command carried by the wire form of the record
    #[serde(default)]
    pub message: WorkerMessage,
}

impl WorkerRecord {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, version: i64) -> Self {
        Self {
            id: RecordId::generate(),
            uuid: uuid.into(),
            name: name.into(),
            hostname: String::new(),
            port: 0,
            environment: String::new(),
            version,
            pid: 0,
            status: WorkerStatus::default(),
            timestamp: Utc::now(),
            monitor: MonitorStats::default(),
            message: WorkerMessage::default(),
        }
    }

    pub fn with_message(mut self, command: impl Into<String>, option: impl Into<String>) -> Self {
        self.message = WorkerMessage {
            command: command.into(),
            option: option.into(),
        };
        self
    }

    pub fn with_host(mut self, hostname: impl Into<String>, port: u16) -> Self {
        self.hostname = hostname.into();
        self.port = port;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Stamp the record as a freshly admitted, started worker.
    pub fn into_started(mut self, deadline: DateTime<Utc>) -> Self {
        self.id = RecordId::generate();
        self.status = WorkerStatus::Started;
        self.timestamp = deadline;
        self
    }

    pub fn is_started(&self) -> bool {
        self.status == WorkerStatus::Started
    }

    /// Name with everything from the first `-` stripped.
    pub fn normalized_name(&self) -> &str {
        normalize_name(&self.name)
    }

    /// Human-readable audit line, e.g. `START : auth - (hostname: h1 version: 13 uuid: A pid: 42)`
    pub fn audit_line(&self, event: &str) -> String {
        format!(
            "{} : {} - (hostname: {} version: {} uuid: {} pid: {})",
            event, self.name, self.hostname, self.version, self.uuid, self.pid
        )
    }
}

/// Convert `foo-1`, `foo-*` etc. to `foo`
pub fn normalize_name(name: &str) -> &str {
    match name.split_once('-') {
        Some((head, _)) => head,
        None => name,
    }
}

/// Worker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Admitted and heartbeating
    Started,
    /// Reported itself as stopped
    Stopped,
    /// Known but never admitted
    #[default]
    NotStarted,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Started => "started",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::NotStarted => "not_started",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource usage sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Resident memory in bytes
    #[serde(default)]
    pub mem: u64,

    /// Seconds since the worker process started
    #[serde(default)]
    pub uptime: u64,
}

/// Command envelope embedded in a worker record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerMessage {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub option: String,
}

/// Lifecycle commands a worker can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Add,
    AddWithProxy,
    Ack,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command not recognized: {0}")]
pub struct ParseCommandError(pub String);

impl FromStr for WorkerCommand {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(WorkerCommand::Add),
            "addWithProxy" | "add-with-proxy" => Ok(WorkerCommand::AddWithProxy),
            "ack" => Ok(WorkerCommand::Ack),
            "update" => Ok(WorkerCommand::Update),
            other => Err(ParseCommandError(other.to_string())),
        }
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerCommand::Add => "add",
            WorkerCommand::AddWithProxy => "addWithProxy",
            WorkerCommand::Ack => "ack",
            WorkerCommand::Update => "update",
        };
        f.write_str(s)
    }
}

/// Admission policy requested by an `add` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusivityMode {
    /// A single instance per name
    One,
    /// A single version family per normalized name
    Version,
    /// Unlimited instances
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no valid option specified for add: '{0}'")]
pub struct ParseOptionError(pub String);

impl FromStr for ExclusivityMode {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" => Ok(ExclusivityMode::One),
            "version" => Ok(ExclusivityMode::Version),
            "many" => Ok(ExclusivityMode::Many),
            other => Err(ParseOptionError(other.to_string())),
        }
    }
}

impl fmt::Display for ExclusivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExclusivityMode::One => "one",
            ExclusivityMode::Version => "version",
            ExclusivityMode::Many => "many",
        };
        f.write_str(s)
    }
}
