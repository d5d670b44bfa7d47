//! Admin interfaces of the two backends the coordinator drives.
//!
//! The execution backend generates snapshot tokens; the consensus backend only
//! ever mirrors its state under a token it is handed.

pub mod beacon_mock;
pub mod hardhat;

pub use beacon_mock::{BeaconMockManager, BeaconState, Validator, ValidatorStatus};
pub use hardhat::HardhatAdmin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::snapshot::SnapshotId;

/// Which side of the backend pair an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    Execution,
    Consensus,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Execution => f.write_str("execution"),
            Backend::Consensus => f.write_str("consensus"),
        }
    }
}

/// Failure reported by a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// True when the call never produced an answer from the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

/// Snapshot primitives of the execution node.
///
/// Tokens are single-use: a successful revert consumes the snapshot along
/// with every snapshot taken after it.
#[async_trait]
pub trait ExecutionAdmin: Send + Sync + fmt::Debug {
    async fn snapshot(&self) -> Result<SnapshotId, BackendError>;
    async fn revert(&self, id: &SnapshotId) -> Result<(), BackendError>;
}

/// Snapshot primitives of the consensus client mock.
#[async_trait]
pub trait ConsensusAdmin: Send + Sync + fmt::Debug {
    /// Records the current state under `id`. Never generates its own token.
    async fn take_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError>;
    async fn revert_to_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError>;

    /// Forget the state recorded under `id` once its execution token is gone.
    async fn discard_snapshot(&self, _id: &SnapshotId) -> Result<(), BackendError> {
        Ok(())
    }
}
