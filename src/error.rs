use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backends::{Backend, BackendError};
use crate::snapshot::SnapshotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Coordinator operation an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Snapshot,
    Revert,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Snapshot => f.write_str("snapshot"),
            Operation::Revert => f.write_str("revert"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("coordinator initialization failed: {0}")]
    Initialization(String),

    #[error("{backend} backend unavailable during {operation}: {source}")]
    BackendUnavailable {
        backend: Backend,
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error("{backend} backend failed to create a snapshot: {source}")]
    SnapshotFailed {
        backend: Backend,
        #[source]
        source: BackendError,
    },

    #[error("{backend} backend failed to revert to snapshot {id}: {source}")]
    RevertFailed {
        backend: Backend,
        id: SnapshotId,
        #[source]
        source: BackendError,
    },

    #[error("backends diverged at snapshot {id}: {backend} backend failed during {operation}: {source}")]
    InconsistentState {
        id: SnapshotId,
        backend: Backend,
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error("baseline could not be regenerated after reverting to {previous}; no usable baseline remains")]
    StaleBaseline {
        previous: SnapshotId,
        #[source]
        source: Box<SnapshotError>,
    },

    #[error("no baseline snapshot is established")]
    MissingBaseline,

    #[error("snapshot coordinator is closed")]
    Closed,
}

impl SnapshotError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SnapshotError::Closed => ErrorSeverity::Low,
            SnapshotError::Initialization(_)
            | SnapshotError::SnapshotFailed { .. }
            | SnapshotError::MissingBaseline => ErrorSeverity::Medium,
            SnapshotError::BackendUnavailable { .. } | SnapshotError::RevertFailed { .. } => {
                ErrorSeverity::High
            }
            SnapshotError::InconsistentState { .. } | SnapshotError::StaleBaseline { .. } => {
                ErrorSeverity::Critical
            }
        }
    }

    /// The joint backend state can no longer be trusted; tear the harness down
    /// and bootstrap a fresh one.
    pub fn requires_rebootstrap(&self) -> bool {
        matches!(
            self,
            SnapshotError::RevertFailed { .. }
                | SnapshotError::InconsistentState { .. }
                | SnapshotError::StaleBaseline { .. }
                | SnapshotError::MissingBaseline
        ) || matches!(
            self,
            SnapshotError::BackendUnavailable {
                operation: Operation::Revert,
                ..
            }
        )
    }

    pub fn backend(&self) -> Option<Backend> {
        match self {
            SnapshotError::BackendUnavailable { backend, .. }
            | SnapshotError::SnapshotFailed { backend, .. }
            | SnapshotError::RevertFailed { backend, .. }
            | SnapshotError::InconsistentState { backend, .. } => Some(*backend),
            SnapshotError::StaleBaseline { source, .. } => source.backend(),
            _ => None,
        }
    }
}
