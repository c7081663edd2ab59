//! State-provider abstraction and remote-operation hardening for Arachne.

pub mod artifacts;
pub mod mock;
pub mod retry;
pub mod rpc;

use alloy_primitives::{Address, Bytes};
use arachne_core::{ArachneResult, BuildArtifact, SnapshotId};
use async_trait::async_trait;

pub use artifacts::HttpArtifactSource;
pub use mock::MockChain;
pub use retry::RetryPolicy;
pub use rpc::RpcProvider;

/// Abstraction over the blockchain state a crawl or scenario runs against.
///
/// Implementations are expected to be cheap to share behind an `Arc`; all
/// mutability is interior.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn chain_id(&self) -> ArachneResult<u64>;

    /// Whether the address holds non-empty code.
    async fn is_contract(&self, address: Address) -> ArachneResult<bool>;

    /// Read a no-argument field returning one or more addresses.
    async fn read_address_field(&self, address: Address, field: &str)
        -> ArachneResult<Vec<Address>>;

    /// Read a no-argument field returning a string.
    async fn read_text_field(&self, address: Address, field: &str) -> ArachneResult<String>;

    /// Deploy the artifact's bytecode with pre-encoded constructor args.
    async fn deploy_contract(
        &self,
        artifact: &BuildArtifact,
        args: &[Bytes],
    ) -> ArachneResult<Address>;

    async fn snapshot(&self) -> ArachneResult<SnapshotId>;

    /// Returns false when the snapshot handle is unknown or already spent.
    async fn revert(&self, snapshot: &SnapshotId) -> ArachneResult<bool>;

    /// Drop any pending-transaction-count tracking on known signers.
    ///
    /// Invoked between retry attempts so a stuck nonce from a failed
    /// attempt cannot poison the next one.
    async fn reset_signers(&self) -> ArachneResult<()> {
        Ok(())
    }
}

/// Source of build artifacts (ABI + contract-type name) for an address.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// `None` means "not known here" -- callers treat it as soft-missing.
    async fn artifact_for(
        &self,
        network: &str,
        address: Address,
    ) -> ArachneResult<Option<BuildArtifact>>;
}
