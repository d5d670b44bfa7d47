//! Configuration for the test harness
//!
//! Values default to a local test network and can be overridden from the
//! environment the same way the CI scripts start the execution node.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Environment variable holding the URL of the locally running Hardhat instance
pub const HARDHAT_URL_ENV: &str = "HARDHAT_URL";
/// Per-call timeout for backend admin calls, in seconds
pub const BACKEND_TIMEOUT_ENV: &str = "HARNESS_BACKEND_TIMEOUT_SECS";
/// Prefix of the temporary config directory
pub const CONFIG_DIR_PREFIX_ENV: &str = "HARNESS_CONFIG_DIR_PREFIX";
/// Chain ID reported by the beacon mock
pub const BEACON_CHAIN_ID_ENV: &str = "BEACON_CHAIN_ID";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// JSON-RPC URL of the execution node
    pub execution_url: Option<String>,
    /// Upper bound for every backend admin call
    pub backend_timeout: Duration,
    /// Prefix of the temporary directory created for each harness
    pub config_dir_prefix: String,
    /// Beacon mock settings
    pub beacon: BeaconMockConfig,
}

/// Beacon mock chain parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconMockConfig {
    pub chain_id: u64,
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub deposit_contract: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            execution_url: None,
            backend_timeout: Duration::from_secs(10),
            config_dir_prefix: "hd-tests-".to_string(),
            beacon: BeaconMockConfig::default(),
        }
    }
}

impl Default for BeaconMockConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            genesis_time: 1_606_824_023,
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            deposit_contract: "0x00000000219ab540356cBB839Cbe05303d7705Fa".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var(HARDHAT_URL_ENV) {
            if !url.trim().is_empty() {
                config.execution_url = Some(url);
            }
        }

        if let Ok(timeout) = env::var(BACKEND_TIMEOUT_ENV) {
            if let Ok(secs) = timeout.parse() {
                config.backend_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(prefix) = env::var(CONFIG_DIR_PREFIX_ENV) {
            config.config_dir_prefix = prefix;
        }

        if let Ok(chain_id) = env::var(BEACON_CHAIN_ID_ENV) {
            if let Ok(id) = chain_id.parse() {
                config.beacon.chain_id = id;
            }
        }

        config
    }

    pub fn with_execution_url(mut self, url: impl Into<String>) -> Self {
        self.execution_url = Some(url.into());
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match &self.execution_url {
            None => return Err(format!("{HARDHAT_URL_ENV} env var not set")),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                return Err(format!("Execution URL [{url}] must be an http(s) URL"));
            }
            Some(_) => {}
        }

        if self.backend_timeout.is_zero() {
            return Err("Backend timeout must be greater than 0".to_string());
        }

        if self.config_dir_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err("Config dir prefix must not contain a path separator".to_string());
        }

        self.beacon.validate()
    }
}

impl BeaconMockConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.seconds_per_slot == 0 {
            return Err("Seconds per slot must be greater than 0".to_string());
        }
        if self.slots_per_epoch == 0 {
            return Err("Slots per epoch must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_execution_url() {
        let config = HarnessConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains(HARDHAT_URL_ENV));

        let config = config.with_execution_url("http://127.0.0.1:8545");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = HarnessConfig::default().with_execution_url("http://127.0.0.1:8545");

        let config = base.clone().with_execution_url("ws://127.0.0.1:8545");
        assert!(config.validate().is_err());

        let config = base.clone().with_backend_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut config = base;
        config.beacon.slots_per_epoch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = HarnessConfig::default().with_execution_url("http://localhost:8545");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: HarnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.execution_url, config.execution_url);
        assert_eq!(parsed.backend_timeout, config.backend_timeout);
        assert_eq!(parsed.beacon, config.beacon);
    }
}
