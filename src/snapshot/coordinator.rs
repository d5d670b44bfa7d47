//! Joint snapshot/revert over the execution node and the beacon mock.
//!
//! The execution node leads: it issues the token, and the beacon mock records
//! its own state under that same token. A revert walks the same order, so a
//! failed execution revert never touches consensus state. When the second half
//! of either operation fails the first half cannot be undone, so the failure is
//! reported as [`SnapshotError::InconsistentState`] and the orphaned token is
//! recorded instead of being handed out.
//!
//! Mutating operations take `&mut self`; one coordinator serves one test at a
//! time. Parallel tests need their own coordinator and backend pair.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{CoordinatorState, OrphanedSnapshot, SnapshotId};
use crate::backends::{Backend, BackendError, ConsensusAdmin, ExecutionAdmin};
use crate::error::{Operation, SnapshotError};
use crate::metrics::SnapshotMetrics;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
pub struct CoordinatorBuilder {
    execution: Option<Arc<dyn ExecutionAdmin>>,
    consensus: Option<Arc<dyn ConsensusAdmin>>,
    baseline: Option<SnapshotId>,
    call_timeout: Option<Duration>,
}

impl CoordinatorBuilder {
    pub fn execution(mut self, execution: Arc<dyn ExecutionAdmin>) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn consensus(mut self, consensus: Arc<dyn ConsensusAdmin>) -> Self {
        self.consensus = Some(consensus);
        self
    }

    /// Adopt an already-taken joint snapshot as the baseline
    pub fn baseline(mut self, baseline: SnapshotId) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<SnapshotCoordinator, SnapshotError> {
        let execution = self.execution.ok_or_else(|| {
            SnapshotError::Initialization("execution admin handle is not set".to_string())
        })?;
        let consensus = self.consensus.ok_or_else(|| {
            SnapshotError::Initialization("consensus admin handle is not set".to_string())
        })?;

        let call_timeout = self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);
        if call_timeout.is_zero() {
            return Err(SnapshotError::Initialization(
                "call timeout must be greater than 0".to_string(),
            ));
        }

        let metrics = SnapshotMetrics::new()
            .map_err(|e| SnapshotError::Initialization(format!("metrics registry: {e}")))?;

        Ok(SnapshotCoordinator {
            execution,
            consensus,
            issued: self.baseline.iter().cloned().collect(),
            baseline: self.baseline,
            state: CoordinatorState::Ready,
            diverged: false,
            orphaned: Vec::new(),
            call_timeout,
            metrics,
        })
    }
}

#[derive(Debug)]
pub struct SnapshotCoordinator {
    execution: Arc<dyn ExecutionAdmin>,
    consensus: Arc<dyn ConsensusAdmin>,
    baseline: Option<SnapshotId>,
    /// Live execution tokens, oldest first
    issued: Vec<SnapshotId>,
    state: CoordinatorState,
    diverged: bool,
    orphaned: Vec<OrphanedSnapshot>,
    call_timeout: Duration,
    metrics: SnapshotMetrics,
}

impl SnapshotCoordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn baseline(&self) -> Option<&SnapshotId> {
        self.baseline.as_ref()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// True after a revert left the backends at different points.
    /// Cleared by the next successful joint revert.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    pub fn orphaned_snapshots(&self) -> &[OrphanedSnapshot] {
        &self.orphaned
    }

    pub fn metrics(&self) -> &SnapshotMetrics {
        &self.metrics
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Take the first baseline, replacing any existing one
    pub async fn establish_baseline(&mut self) -> Result<SnapshotId, SnapshotError> {
        let baseline = self.take_snapshot().await?;
        if let Some(previous) = self.baseline.replace(baseline.clone()) {
            debug!("Replaced baseline snapshot {} with {}", previous, baseline);
        }
        info!("Established baseline snapshot {}", baseline);
        Ok(baseline)
    }

    /// Snapshot both backends under one token
    pub async fn take_snapshot(&mut self) -> Result<SnapshotId, SnapshotError> {
        self.ensure_ready()?;

        let id = self
            .bounded(Backend::Execution, self.execution.snapshot())
            .await
            .map_err(|source| {
                if source.is_transport() {
                    SnapshotError::BackendUnavailable {
                        backend: Backend::Execution,
                        operation: Operation::Snapshot,
                        source,
                    }
                } else {
                    SnapshotError::SnapshotFailed {
                        backend: Backend::Execution,
                        source,
                    }
                }
            })?;
        self.issued.push(id.clone());

        let mirrored = self
            .bounded(Backend::Consensus, self.consensus.take_snapshot(&id))
            .await;
        if let Err(source) = mirrored {
            self.record_orphan(&id, &source);
            return Err(SnapshotError::InconsistentState {
                id,
                backend: Backend::Consensus,
                operation: Operation::Snapshot,
                source,
            });
        }

        self.metrics.snapshots_taken.inc();
        debug!("Took joint snapshot {}", id);
        Ok(id)
    }

    /// Revert the execution node first, then the beacon mock
    pub async fn revert_to_snapshot(&mut self, id: &SnapshotId) -> Result<(), SnapshotError> {
        self.ensure_ready()?;

        self.bounded(Backend::Execution, self.execution.revert(id))
            .await
            .map_err(|source| {
                if source.is_transport() {
                    SnapshotError::BackendUnavailable {
                        backend: Backend::Execution,
                        operation: Operation::Revert,
                        source,
                    }
                } else {
                    SnapshotError::RevertFailed {
                        backend: Backend::Execution,
                        id: id.clone(),
                        source,
                    }
                }
            })?;

        let consumed = self.release_consumed(id);

        let reverted = self
            .bounded(Backend::Consensus, self.consensus.revert_to_snapshot(id))
            .await;
        if let Err(source) = reverted {
            self.diverged = true;
            self.metrics.inconsistent_states.inc();
            error!(
                "Execution node reverted to {} but the beacon mock did not: {}",
                id, source
            );
            return Err(SnapshotError::InconsistentState {
                id: id.clone(),
                backend: Backend::Consensus,
                operation: Operation::Revert,
                source,
            });
        }

        self.diverged = false;
        self.metrics.reverts.inc();
        debug!("Reverted both backends to {}", id);
        self.discard_mirrors(consumed).await;
        Ok(())
    }

    /// Revert to the baseline and immediately take a new one, since the
    /// execution node cannot revert to the same snapshot twice.
    pub async fn revert_to_baseline(&mut self) -> Result<(), SnapshotError> {
        self.ensure_ready()?;
        let baseline = self.baseline.clone().ok_or(SnapshotError::MissingBaseline)?;

        if let Err(err) = self.revert_to_snapshot(&baseline).await {
            // Either the execution half consumed the token or the node no
            // longer knows it. Only a transport failure leaves it in doubt.
            if matches!(
                err,
                SnapshotError::InconsistentState { .. }
                    | SnapshotError::RevertFailed {
                        source: BackendError::Rejected(_),
                        ..
                    }
            ) {
                warn!("Dropping dead baseline snapshot {}", baseline);
                self.baseline = None;
            }
            return Err(err);
        }

        match self.take_snapshot().await {
            Ok(renewed) => {
                info!("Renewed baseline snapshot {} -> {}", baseline, renewed);
                self.baseline = Some(renewed);
                self.metrics.baseline_renewals.inc();
                Ok(())
            }
            Err(source) => {
                self.baseline = None;
                error!(
                    "Reverted to baseline {} but could not take a new one: {}",
                    baseline, source
                );
                Err(SnapshotError::StaleBaseline {
                    previous: baseline,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Test-controlled checkpoint; does not touch the baseline
    pub async fn create_custom_snapshot(&mut self) -> Result<SnapshotId, SnapshotError> {
        self.take_snapshot().await
    }

    /// Reverting to a checkpoint older than the baseline consumes the baseline
    /// too; `baseline()` is `None` afterwards.
    pub async fn revert_to_custom_snapshot(&mut self, id: &SnapshotId) -> Result<(), SnapshotError> {
        self.revert_to_snapshot(id).await
    }

    pub fn close(&mut self) {
        if self.state == CoordinatorState::Closed {
            return;
        }
        self.state = CoordinatorState::Closed;
        if !self.orphaned.is_empty() {
            warn!(
                "Closing snapshot coordinator with {} orphaned execution snapshot(s)",
                self.orphaned.len()
            );
        }
        info!("Snapshot coordinator closed");
    }

    fn ensure_ready(&self) -> Result<(), SnapshotError> {
        match self.state {
            CoordinatorState::Ready => Ok(()),
            CoordinatorState::Closed => Err(SnapshotError::Closed),
        }
    }

    async fn bounded<T, F>(&self, backend: Backend, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.backend_timeouts.inc();
                warn!(
                    "{} backend call timed out after {:?}",
                    backend, self.call_timeout
                );
                Err(BackendError::Timeout(self.call_timeout))
            }
        }
    }

    /// Forget every token the execution node dropped when it reverted to `id`.
    /// Returns the ones that still have a consensus mirror.
    fn release_consumed(&mut self, id: &SnapshotId) -> Vec<SnapshotId> {
        let Some(position) = self.issued.iter().position(|issued| issued == id) else {
            return Vec::new();
        };
        let (orphans, mirrored): (Vec<SnapshotId>, Vec<SnapshotId>) = self
            .issued
            .drain(position..)
            .partition(|token| self.orphaned.iter().any(|orphan| &orphan.id == token));

        if self
            .baseline
            .as_ref()
            .is_some_and(|baseline| mirrored.contains(baseline))
        {
            if let Some(baseline) = self.baseline.take() {
                if &baseline != id {
                    warn!(
                        "Revert to {} consumed baseline snapshot {}; a new baseline is needed",
                        id, baseline
                    );
                }
            }
        }
        if !orphans.is_empty() {
            self.orphaned.retain(|orphan| !orphans.contains(&orphan.id));
            debug!(
                "Released {} orphaned execution snapshot(s) consumed by revert to {}",
                orphans.len(),
                id
            );
        }
        mirrored
    }

    async fn discard_mirrors(&self, consumed: Vec<SnapshotId>) {
        for id in consumed {
            if let Err(e) = self
                .bounded(Backend::Consensus, self.consensus.discard_snapshot(&id))
                .await
            {
                warn!("Could not discard beacon snapshot {}: {}", id, e);
            }
        }
    }

    fn record_orphan(&mut self, id: &SnapshotId, source: &BackendError) {
        warn!(
            "Execution snapshot {} has no consensus mirror and will not be used: {}",
            id, source
        );
        self.metrics.orphaned_snapshots.inc();
        self.orphaned.push(OrphanedSnapshot {
            id: id.clone(),
            recorded_at: Utc::now(),
            reason: source.to_string(),
        });
    }
}
