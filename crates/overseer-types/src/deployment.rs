//! Deployment metadata
//!
//! A deployment describes a released build. It is owned by whatever publishes
//! builds; Overseer only reads, counts against and deletes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one released build number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// Build number as published by the release pipeline
    pub build_number: String,

    /// When the deployment metadata was recorded
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl DeploymentInfo {
    pub fn new(build_number: impl Into<String>) -> Self {
        Self {
            build_number: build_number.into(),
            created_at: Utc::now(),
        }
    }

    /// Worker version this build corresponds to, if the build number is numeric.
    pub fn version(&self) -> Option<i64> {
        self.build_number.trim().parse().ok()
    }
}
