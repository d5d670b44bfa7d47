//! Bootstrapping and teardown for tests that run against a shared execution
//! node and a beacon mock.

use eyre::{eyre, Result, WrapErr};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backends::{BeaconMockManager, HardhatAdmin};
use crate::config::HarnessConfig;
use crate::error::SnapshotError;
use crate::snapshot::{CoordinatorState, SnapshotCoordinator, SnapshotId};

/// Install a fmt subscriber that writes through the test harness capture.
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}

/// One isolated test environment: a temporary config directory, the two
/// backends, and the coordinator that keeps them in step.
#[derive(Debug)]
pub struct TestHarness {
    config: HarnessConfig,
    execution: Arc<HardhatAdmin>,
    beacon: Arc<BeaconMockManager>,
    coordinator: SnapshotCoordinator,
    config_dir: Option<PathBuf>,
}

impl TestHarness {
    pub async fn from_env() -> Result<Self> {
        Self::new(HarnessConfig::from_env()).await
    }

    /// Connect both backends and take the baseline snapshot
    pub async fn new(config: HarnessConfig) -> Result<Self> {
        config.validate().map_err(|e| eyre!(e))?;

        let config_dir = create_config_dir(&config.config_dir_prefix)?;
        info!("Created temp config dir {}", config_dir.display());

        match Self::bootstrap(config, config_dir.clone()).await {
            Ok(harness) => Ok(harness),
            Err(e) => {
                remove_config_dir(&config_dir);
                Err(e)
            }
        }
    }

    async fn bootstrap(config: HarnessConfig, config_dir: PathBuf) -> Result<Self> {
        let url = config
            .execution_url
            .clone()
            .ok_or_else(|| eyre!("execution URL is not set"))?;

        let execution = Arc::new(
            HardhatAdmin::connect(&url, config.backend_timeout)
                .wrap_err_with(|| format!("error creating RPC client binding for [{url}]"))?,
        );
        let beacon = Arc::new(BeaconMockManager::new(config.beacon.clone()));

        let mut coordinator = SnapshotCoordinator::builder()
            .execution(execution.clone())
            .consensus(beacon.clone())
            .call_timeout(config.backend_timeout)
            .build()?;
        coordinator
            .establish_baseline()
            .await
            .wrap_err("error creating baseline snapshot")?;

        Ok(Self {
            config,
            execution,
            beacon,
            coordinator,
            config_dir: Some(config_dir),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn execution(&self) -> &Arc<HardhatAdmin> {
        &self.execution
    }

    pub fn beacon(&self) -> &Arc<BeaconMockManager> {
        &self.beacon
    }

    /// `None` once the harness has been cleaned up
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    pub fn coordinator(&self) -> &SnapshotCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut SnapshotCoordinator {
        &mut self.coordinator
    }

    /// Reverts both backends to the baseline snapshot
    pub async fn revert_to_baseline(&mut self) -> Result<(), SnapshotError> {
        self.coordinator.revert_to_baseline().await
    }

    pub async fn create_custom_snapshot(&mut self) -> Result<SnapshotId, SnapshotError> {
        self.coordinator.create_custom_snapshot().await
    }

    pub async fn revert_to_custom_snapshot(&mut self, id: &SnapshotId) -> Result<(), SnapshotError> {
        self.coordinator.revert_to_custom_snapshot(id).await
    }

    /// Revert to the baseline, close the coordinator and delete the config dir.
    /// Errors are logged; calling it again is a no-op.
    pub async fn cleanup(&mut self) {
        if self.coordinator.state() == CoordinatorState::Ready {
            if let Err(e) = self.coordinator.revert_to_baseline().await {
                error!("Error reverting to baseline during cleanup: {}", e);
            }
            self.coordinator.close();
        }

        if let Some(dir) = self.config_dir.take() {
            remove_config_dir(&dir);
            info!("Removed temp config dir {}", dir.display());
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        if let Some(dir) = self.config_dir.take() {
            warn!("Test harness dropped without cleanup; backends were not reverted");
            remove_config_dir(&dir);
        }
    }
}

fn create_config_dir(prefix: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("{prefix}{}", Uuid::new_v4().simple()));
    fs::create_dir(&dir)
        .wrap_err_with(|| format!("error creating temp config dir [{}]", dir.display()))?;
    Ok(dir)
}

fn remove_config_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != io::ErrorKind::NotFound {
            error!("error removing temp config dir [{}]: {}", dir.display(), e);
        }
    }
}
