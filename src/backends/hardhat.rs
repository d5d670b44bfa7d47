use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{BackendError, ExecutionAdmin};
use crate::snapshot::SnapshotId;

/// JSON-RPC admin client for a Hardhat-compatible execution node
#[derive(Debug, Clone)]
pub struct HardhatAdmin {
    client: HttpClient,
    url: String,
    timeout: Duration,
}

impl HardhatAdmin {
    /// Build a client for `url`. No request is sent until the first call.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| BackendError::Unavailable(format!("invalid execution URL [{url}]: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current chain head
    pub async fn block_number(&self) -> Result<u64, BackendError> {
        let raw: String = self
            .client
            .request("eth_blockNumber", rpc_params![])
            .await
            .map_err(|e| self.classify("eth_blockNumber", e))?;
        parse_quantity(&raw)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| BackendError::Rejected(format!("eth_blockNumber returned [{raw}]")))
    }

    /// Mine a single empty block
    pub async fn mine(&self) -> Result<(), BackendError> {
        let _: Value = self
            .client
            .request("evm_mine", rpc_params![])
            .await
            .map_err(|e| self.classify("evm_mine", e))?;
        Ok(())
    }

    pub async fn balance(&self, address: Address) -> Result<U256, BackendError> {
        let raw: String = self
            .client
            .request("eth_getBalance", rpc_params![address.to_string(), "latest"])
            .await
            .map_err(|e| self.classify("eth_getBalance", e))?;
        parse_quantity(&raw)
            .ok_or_else(|| BackendError::Rejected(format!("eth_getBalance returned [{raw}]")))
    }

    pub async fn set_balance(&self, address: Address, balance: U256) -> Result<(), BackendError> {
        let _: Value = self
            .client
            .request(
                "hardhat_setBalance",
                rpc_params![address.to_string(), format!("{balance:#x}")],
            )
            .await
            .map_err(|e| self.classify("hardhat_setBalance", e))?;
        Ok(())
    }

    fn classify(&self, method: &str, err: ClientError) -> BackendError {
        let message = format!("{method} on {}: {err}", self.url);
        match err {
            ClientError::RequestTimeout => BackendError::Timeout(self.timeout),
            ClientError::Transport(_) | ClientError::RestartNeeded(_) => {
                BackendError::Unavailable(message)
            }
            _ => BackendError::Rejected(message),
        }
    }
}

#[async_trait]
impl ExecutionAdmin for HardhatAdmin {
    async fn snapshot(&self) -> Result<SnapshotId, BackendError> {
        let name: String = self
            .client
            .request("evm_snapshot", rpc_params![])
            .await
            .map_err(|e| self.classify("evm_snapshot", e))?;
        debug!("evm_snapshot returned {}", name);
        Ok(SnapshotId::new(name))
    }

    async fn revert(&self, id: &SnapshotId) -> Result<(), BackendError> {
        let reverted: bool = self
            .client
            .request("evm_revert", rpc_params![id.as_str()])
            .await
            .map_err(|e| self.classify("evm_revert", e))?;

        if !reverted {
            return Err(BackendError::Rejected(format!(
                "evm_revert refused snapshot {id}"
            )));
        }
        Ok(())
    }
}

fn parse_quantity(raw: &str) -> Option<U256> {
    U256::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10"), Some(U256::from(16)));
        assert_eq!(parse_quantity("0x0"), Some(U256::ZERO));
        assert_eq!(parse_quantity("not a number"), None);
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let err = HardhatAdmin::connect("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_unavailable() {
        // Nothing listens on the discard port.
        let admin = HardhatAdmin::connect("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = admin.snapshot().await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }
}
