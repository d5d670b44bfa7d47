//! In-process beacon node mock with named snapshots.
//!
//! The live state sits behind a `parking_lot::RwLock`; snapshots are deep
//! copies keyed by the token the execution node handed out.

use alloy::primitives::{FixedBytes, B256};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{BackendError, ConsensusAdmin};
use crate::config::BeaconMockConfig;
use crate::snapshot::SnapshotId;

/// BLS public key
pub type ValidatorPubkey = FixedBytes<48>;

/// Balance assigned to a freshly deposited validator, in gwei
pub const DEFAULT_VALIDATOR_BALANCE: u64 = 32_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub index: u64,
    pub pubkey: ValidatorPubkey,
    pub withdrawal_credentials: B256,
    /// Gwei
    pub balance: u64,
    pub status: ValidatorStatus,
    pub activation_epoch: Option<u64>,
    pub exit_epoch: Option<u64>,
}

/// Everything a snapshot captures
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BeaconState {
    pub current_slot: u64,
    pub validators: BTreeMap<u64, Validator>,
}

#[derive(Debug)]
pub struct BeaconMockManager {
    config: BeaconMockConfig,
    state: RwLock<BeaconState>,
    snapshots: DashMap<SnapshotId, BeaconState>,
}

impl BeaconMockManager {
    pub fn new(config: BeaconMockConfig) -> Self {
        Self {
            config,
            state: RwLock::new(BeaconState::default()),
            snapshots: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BeaconMockConfig {
        &self.config
    }

    /// Copy of the live state
    pub fn state(&self) -> BeaconState {
        self.state.read().clone()
    }

    pub fn current_slot(&self) -> u64 {
        self.state.read().current_slot
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_slot() / self.config.slots_per_epoch
    }

    pub fn set_current_slot(&self, slot: u64) {
        self.state.write().current_slot = slot;
    }

    pub fn advance_slots(&self, count: u64) -> u64 {
        let mut state = self.state.write();
        state.current_slot = state.current_slot.saturating_add(count);
        state.current_slot
    }

    pub fn validator_count(&self) -> usize {
        self.state.read().validators.len()
    }

    /// Register a validator as a new deposit. Returns its index.
    pub fn add_validator(
        &self,
        pubkey: ValidatorPubkey,
        withdrawal_credentials: B256,
    ) -> Result<u64, BackendError> {
        let mut state = self.state.write();
        if state.validators.values().any(|v| v.pubkey == pubkey) {
            return Err(BackendError::Rejected(format!(
                "validator with pubkey {pubkey} already exists"
            )));
        }

        let index = state.validators.len() as u64;
        state.validators.insert(
            index,
            Validator {
                index,
                pubkey,
                withdrawal_credentials,
                balance: DEFAULT_VALIDATOR_BALANCE,
                status: ValidatorStatus::PendingInitialized,
                activation_epoch: None,
                exit_epoch: None,
            },
        );
        debug!("Added validator {} ({})", index, pubkey);
        Ok(index)
    }

    pub fn validator(&self, index: u64) -> Option<Validator> {
        self.state.read().validators.get(&index).cloned()
    }

    pub fn validator_by_pubkey(&self, pubkey: &ValidatorPubkey) -> Option<Validator> {
        self.state
            .read()
            .validators
            .values()
            .find(|v| &v.pubkey == pubkey)
            .cloned()
    }

    pub fn set_validator_balance(&self, index: u64, balance: u64) -> Result<(), BackendError> {
        self.with_validator(index, |v| v.balance = balance)
    }

    /// Set the status directly. Moving to `ActiveOngoing` stamps the activation epoch.
    pub fn set_validator_status(
        &self,
        index: u64,
        status: ValidatorStatus,
    ) -> Result<(), BackendError> {
        let epoch = self.current_epoch();
        self.with_validator(index, |v| {
            if status == ValidatorStatus::ActiveOngoing && v.activation_epoch.is_none() {
                v.activation_epoch = Some(epoch);
            }
            v.status = status;
        })
    }

    /// Mark an active validator as exited in the current epoch
    pub fn exit_validator(&self, index: u64) -> Result<(), BackendError> {
        let epoch = self.current_epoch();
        let mut state = self.state.write();
        let validator = state
            .validators
            .get_mut(&index)
            .ok_or_else(|| BackendError::Rejected(format!("validator {index} does not exist")))?;

        if validator.status != ValidatorStatus::ActiveOngoing {
            return Err(BackendError::Rejected(format!(
                "validator {index} is not active ({:?})",
                validator.status
            )));
        }
        validator.status = ValidatorStatus::ExitedUnslashed;
        validator.exit_epoch = Some(epoch);
        Ok(())
    }

    pub fn has_snapshot(&self, name: &SnapshotId) -> bool {
        self.snapshots.contains_key(name)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Drop the snapshot recorded under `name`. Returns false if there was none.
    pub fn discard_snapshot(&self, name: &SnapshotId) -> bool {
        let removed = self.snapshots.remove(name).is_some();
        if removed {
            debug!("Discarded beacon snapshot {}", name);
        }
        removed
    }

    /// Record the live state under `name`, replacing any snapshot with that name
    pub fn take_snapshot(&self, name: &SnapshotId) {
        let state = self.state.read().clone();
        self.snapshots.insert(name.clone(), state);
        info!("Took beacon snapshot {}", name);
    }

    /// Restore the state recorded under `name`. The snapshot stays available.
    pub fn revert_to_snapshot(&self, name: &SnapshotId) -> Result<(), BackendError> {
        let snapshot = self
            .snapshots
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                BackendError::Rejected(format!("snapshot with name [{name}] does not exist"))
            })?;

        *self.state.write() = snapshot;
        info!("Reverted beacon mock to snapshot {}", name);
        Ok(())
    }

    fn with_validator(
        &self,
        index: u64,
        update: impl FnOnce(&mut Validator),
    ) -> Result<(), BackendError> {
        let mut state = self.state.write();
        let validator = state
            .validators
            .get_mut(&index)
            .ok_or_else(|| BackendError::Rejected(format!("validator {index} does not exist")))?;
        update(validator);
        Ok(())
    }
}

#[async_trait]
impl ConsensusAdmin for BeaconMockManager {
    async fn take_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        BeaconMockManager::take_snapshot(self, id);
        Ok(())
    }

    async fn revert_to_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        BeaconMockManager::revert_to_snapshot(self, id)
    }

    async fn discard_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        BeaconMockManager::discard_snapshot(self, id);
        Ok(())
    }
}
