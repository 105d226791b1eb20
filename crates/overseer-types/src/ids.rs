//! Strongly-typed identifiers
//!
//! A worker supplies its own opaque `uuid`; the registry additionally stamps
//! every stored incarnation of a worker with a fresh [`RecordId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity marker of one stored registry record.
///
/// A new marker is generated every time a worker is (re-)admitted, so two
/// incarnations of the same worker `uuid` are distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record:{}", self.0)
    }
}
