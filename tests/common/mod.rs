//! In-process stand-ins for the execution node and a disconnectable beacon mock.

#![allow(dead_code)]

use alloy::primitives::U256;
use async_trait::async_trait;
use hyperdrive_test_harness::{
    BackendError, BeaconMockConfig, BeaconMockManager, ConsensusAdmin, HarnessConfig, SnapshotId,
};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct ChainState {
    head: u64,
    balances: HashMap<String, U256>,
}

#[derive(Debug, Default)]
struct ChainInner {
    state: ChainState,
    next_id: u64,
    snapshots: Vec<(String, ChainState)>,
}

/// Hardhat-like node: snapshots are single-use and reverting drops every
/// snapshot taken after the target.
#[derive(Debug, Clone, Default)]
pub struct FakeHardhat {
    inner: Arc<Mutex<ChainInner>>,
}

impl FakeHardhat {
    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().snapshots.len()
    }
}

#[rpc(server)]
pub trait HardhatApi {
    #[method(name = "evm_snapshot")]
    fn evm_snapshot(&self) -> RpcResult<String>;

    #[method(name = "evm_revert")]
    fn evm_revert(&self, id: String) -> RpcResult<bool>;

    #[method(name = "evm_mine")]
    fn evm_mine(&self) -> RpcResult<String>;

    #[method(name = "eth_blockNumber")]
    fn block_number(&self) -> RpcResult<String>;

    #[method(name = "eth_getBalance")]
    fn get_balance(&self, address: String, block: String) -> RpcResult<String>;

    #[method(name = "hardhat_setBalance")]
    fn set_balance(&self, address: String, balance: String) -> RpcResult<bool>;
}

impl HardhatApiServer for FakeHardhat {
    fn evm_snapshot(&self) -> RpcResult<String> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("{:#x}", inner.next_id);
        let state = inner.state.clone();
        inner.snapshots.push((id.clone(), state));
        Ok(id)
    }

    fn evm_revert(&self, id: String) -> RpcResult<bool> {
        let mut inner = self.inner.lock();
        let Some(position) = inner.snapshots.iter().position(|(name, _)| *name == id) else {
            return Ok(false);
        };
        inner.state = inner.snapshots[position].1.clone();
        inner.snapshots.truncate(position);
        Ok(true)
    }

    fn evm_mine(&self) -> RpcResult<String> {
        self.inner.lock().state.head += 1;
        Ok("0x0".to_string())
    }

    fn block_number(&self) -> RpcResult<String> {
        Ok(format!("{:#x}", self.inner.lock().state.head))
    }

    fn get_balance(&self, address: String, _block: String) -> RpcResult<String> {
        let balance = self
            .inner
            .lock()
            .state
            .balances
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or(U256::ZERO);
        Ok(format!("{balance:#x}"))
    }

    fn set_balance(&self, address: String, balance: String) -> RpcResult<bool> {
        let balance = U256::from_str(&balance)
            .map_err(|e| ErrorObjectOwned::owned(-32602, e.to_string(), None::<()>))?;
        self.inner
            .lock()
            .state
            .balances
            .insert(address.to_lowercase(), balance);
        Ok(true)
    }
}

#[derive(Debug)]
pub struct FakeNode {
    pub url: String,
    pub chain: FakeHardhat,
    handle: ServerHandle,
}

impl FakeNode {
    pub async fn spawn() -> Self {
        let server = Server::builder().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let chain = FakeHardhat::default();
        let handle = server.start(chain.clone().into_rpc());

        Self {
            url: format!("http://{addr}"),
            chain,
            handle,
        }
    }

    /// Take the node offline; later calls fail at the transport level
    pub async fn stop(self) {
        self.handle.stop().unwrap();
        self.handle.stopped().await;
    }

    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::default()
            .with_execution_url(self.url.clone())
            .with_backend_timeout(Duration::from_secs(2))
    }
}

/// Beacon mock that can be cut off from the coordinator
#[derive(Debug)]
pub struct FlakyBeacon {
    pub beacon: Arc<BeaconMockManager>,
    connected: AtomicBool,
}

impl FlakyBeacon {
    pub fn new() -> Self {
        Self {
            beacon: Arc::new(BeaconMockManager::new(BeaconMockConfig::default())),
            connected: AtomicBool::new(true),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("beacon mock disconnected".into()))
        }
    }
}

#[async_trait]
impl ConsensusAdmin for FlakyBeacon {
    async fn take_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        self.ensure_connected()?;
        self.beacon.take_snapshot(id);
        Ok(())
    }

    async fn revert_to_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        self.ensure_connected()?;
        self.beacon.revert_to_snapshot(id)
    }

    async fn discard_snapshot(&self, id: &SnapshotId) -> Result<(), BackendError> {
        self.ensure_connected()?;
        self.beacon.discard_snapshot(id);
        Ok(())
    }
}
