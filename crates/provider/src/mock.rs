//! Deterministic in-memory chain for tests and dry runs.
//!
//! Snapshots clone the whole state; revert restores the clone and spends
//! the handle, matching dev-node `evm_snapshot`/`evm_revert` semantics.

use crate::{ArtifactSource, StateProvider};
use alloy_primitives::{Address, Bytes};
use arachne_core::{ArachneError, ArachneResult, BuildArtifact, SnapshotId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
struct ChainState {
    code: HashSet<Address>,
    address_fields: HashMap<(Address, String), Vec<Address>>,
    text_fields: HashMap<(Address, String), String>,
    /// Free-form register scenarios use to verify snapshot restoration.
    control: u64,
}

/// In-memory [`StateProvider`] + [`ArtifactSource`].
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    snapshots: Mutex<HashMap<String, ChainState>>,
    artifacts: Mutex<HashMap<Address, BuildArtifact>>,
    next_snapshot: AtomicU64,
    next_address: AtomicU64,
    deploys: AtomicU64,
    signer_resets: AtomicU64,
    chain_id: u64,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            chain_id: 1337,
            ..Default::default()
        }
    }

    /// Deterministic throwaway address: counter in the low bytes.
    pub fn test_address(n: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Address::from(bytes)
    }

    /// Register a contract account with its build artifact.
    pub fn add_contract(&self, address: Address, artifact: BuildArtifact) {
        self.state.lock().code.insert(address);
        self.artifacts.lock().insert(address, artifact);
    }

    /// Register a contract account the artifact source knows nothing about.
    pub fn add_opaque_contract(&self, address: Address) {
        self.state.lock().code.insert(address);
    }

    pub fn set_address_field(&self, address: Address, field: &str, values: Vec<Address>) {
        self.state
            .lock()
            .address_fields
            .insert((address, field.to_string()), values);
    }

    pub fn set_text_field(&self, address: Address, field: &str, value: &str) {
        self.state
            .lock()
            .text_fields
            .insert((address, field.to_string()), value.to_string());
    }

    pub fn set_control(&self, value: u64) {
        self.state.lock().control = value;
    }

    pub fn control(&self) -> u64 {
        self.state.lock().control
    }

    pub fn deploys(&self) -> u64 {
        self.deploys.load(Ordering::SeqCst)
    }

    pub fn signer_resets(&self) -> u64 {
        self.signer_resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateProvider for MockChain {
    async fn chain_id(&self) -> ArachneResult<u64> {
        Ok(self.chain_id)
    }

    async fn is_contract(&self, address: Address) -> ArachneResult<bool> {
        Ok(self.state.lock().code.contains(&address))
    }

    async fn read_address_field(
        &self,
        address: Address,
        field: &str,
    ) -> ArachneResult<Vec<Address>> {
        self.state
            .lock()
            .address_fields
            .get(&(address, field.to_string()))
            .cloned()
            .ok_or_else(|| {
                ArachneError::Provider(format!("no address field `{field}` on {address:#x}"))
            })
    }

    async fn read_text_field(&self, address: Address, field: &str) -> ArachneResult<String> {
        self.state
            .lock()
            .text_fields
            .get(&(address, field.to_string()))
            .cloned()
            .ok_or_else(|| {
                ArachneError::Provider(format!("no text field `{field}` on {address:#x}"))
            })
    }

    async fn deploy_contract(
        &self,
        artifact: &BuildArtifact,
        _args: &[Bytes],
    ) -> ArachneResult<Address> {
        let n = self.next_address.fetch_add(1, Ordering::SeqCst) + 0x1000;
        let address = Self::test_address(n);
        self.add_contract(address, artifact.clone());
        self.deploys.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%address, contract = %artifact.contract, "mock deploy");
        Ok(address)
    }

    async fn snapshot(&self) -> ArachneResult<SnapshotId> {
        let id = self.next_snapshot.fetch_add(1, Ordering::SeqCst).to_string();
        let state = self.state.lock().clone();
        self.snapshots.lock().insert(id.clone(), state);
        Ok(SnapshotId(id))
    }

    async fn revert(&self, snapshot: &SnapshotId) -> ArachneResult<bool> {
        match self.snapshots.lock().remove(&snapshot.0) {
            Some(saved) => {
                *self.state.lock() = saved;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reset_signers(&self) -> ArachneResult<()> {
        self.signer_resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ArtifactSource for MockChain {
    async fn artifact_for(
        &self,
        _network: &str,
        address: Address,
    ) -> ArachneResult<Option<BuildArtifact>> {
        Ok(self.artifacts.lock().get(&address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_restores_state_and_spends_handle() {
        let chain = MockChain::new();
        chain.set_control(1);

        let snap = chain.snapshot().await.unwrap();
        chain.set_control(2);

        assert!(chain.revert(&snap).await.unwrap());
        assert_eq!(chain.control(), 1);
        // Handle is spent.
        assert!(!chain.revert(&snap).await.unwrap());
    }

    #[tokio::test]
    async fn deploy_yields_fresh_discoverable_contract() {
        let chain = MockChain::new();
        let artifact = BuildArtifact {
            contract: "Token".into(),
            methods: vec!["balanceOf".into()],
            bytecode: None,
        };
        let addr = chain.deploy_contract(&artifact, &[]).await.unwrap();

        assert!(chain.is_contract(addr).await.unwrap());
        let found = chain.artifact_for("test", addr).await.unwrap().unwrap();
        assert_eq!(found.contract, "Token");
        assert_eq!(chain.deploys(), 1);
    }
}
