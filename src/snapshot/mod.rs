pub mod coordinator;

pub use coordinator::{CoordinatorBuilder, SnapshotCoordinator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token naming one joint snapshot of both backends.
///
/// Issued by the execution node; opaque to everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SnapshotId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SnapshotId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorState {
    Ready,
    Closed,
}

/// Execution snapshot whose consensus mirror was never recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedSnapshot {
    pub id: SnapshotId,
    pub recorded_at: DateTime<Utc>,
    pub reason: String,
}
