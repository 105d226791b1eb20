//! Registry predicates
//!
//! Every predicate the supervision daemon issues is one of these variants, so
//! backends can translate them exactly (SQL) or evaluate them directly
//! (in-memory) with identical results.

use overseer_types::{WorkerRecord, WorkerStatus};

/// A predicate over worker records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerQuery {
    /// Every record
    All,

    /// Exact worker identity
    Uuid(String),

    /// Exact name match
    Name(String),

    /// Name starts with `prefix` (case-insensitive) and version differs
    VersionFamily { prefix: String, version: i64 },

    /// Started records of one build version
    StartedWithVersion(i64),
}

impl WorkerQuery {
    /// Conflict predicate for exclusivity mode `one`.
    pub fn same_name(name: impl Into<String>) -> Self {
        WorkerQuery::Name(name.into())
    }

    /// Conflict predicate for exclusivity mode `version`.
    ///
    /// `candidate` is matched by its normalized name, so `auth-2` conflicts
    /// with `auth`, `auth-1` and `AuthWorker` of any other version.
    pub fn other_version_of(candidate: &WorkerRecord) -> Self {
        WorkerQuery::VersionFamily {
            prefix: candidate.normalized_name().to_string(),
            version: candidate.version,
        }
    }

    pub fn matches(&self, worker: &WorkerRecord) -> bool {
        match self {
            WorkerQuery::All => true,
            WorkerQuery::Uuid(uuid) => &worker.uuid == uuid,
            WorkerQuery::Name(name) => &worker.name == name,
            WorkerQuery::VersionFamily { prefix, version } => {
                worker.version != *version
                    && worker.name.to_lowercase().starts_with(&prefix.to_lowercase())
            }
            WorkerQuery::StartedWithVersion(version) => {
                worker.status == WorkerStatus::Started && worker.version == *version
            }
        }
    }
}
