use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Per-coordinator counters. Each coordinator owns its own registry so
/// parallel harnesses never collide on metric names.
#[derive(Debug, Clone)]
pub struct SnapshotMetrics {
    registry: Arc<Registry>,

    pub snapshots_taken: IntCounter,
    pub reverts: IntCounter,
    pub baseline_renewals: IntCounter,

    pub orphaned_snapshots: IntCounter,
    pub inconsistent_states: IntCounter,
    pub backend_timeouts: IntCounter,
}

impl SnapshotMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let snapshots_taken = IntCounter::new("snapshots_taken", "Joint snapshots taken")?;
        let reverts = IntCounter::new("snapshot_reverts", "Joint reverts completed")?;
        let baseline_renewals =
            IntCounter::new("baseline_renewals", "Baseline snapshots regenerated after a revert")?;
        let orphaned_snapshots = IntCounter::new(
            "orphaned_snapshots",
            "Execution snapshots left without a consensus mirror",
        )?;
        let inconsistent_states =
            IntCounter::new("inconsistent_states", "Operations that left the backends diverged")?;
        let backend_timeouts = IntCounter::new("backend_timeouts", "Backend calls that timed out")?;

        registry.register(Box::new(snapshots_taken.clone()))?;
        registry.register(Box::new(reverts.clone()))?;
        registry.register(Box::new(baseline_renewals.clone()))?;
        registry.register(Box::new(orphaned_snapshots.clone()))?;
        registry.register(Box::new(inconsistent_states.clone()))?;
        registry.register(Box::new(backend_timeouts.clone()))?;

        Ok(Self {
            registry,
            snapshots_taken,
            reverts,
            baseline_renewals,
            orphaned_snapshots,
            inconsistent_states,
            backend_timeouts,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
