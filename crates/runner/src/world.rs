//! The mutable blockchain-state handle a scenario runs against.

use arachne_core::{ArachneError, ArachneResult, ContractHandle, SnapshotId};
use arachne_deploy::DeploymentManager;

/// Chain state plus the deployed contract set, with snapshot/revert.
///
/// One `World` per scenario-run session; snapshot/revert brackets every
/// solution-combination trial.
pub struct World {
    chain_id: u64,
    manager: DeploymentManager,
}

impl World {
    pub async fn new(manager: DeploymentManager) -> ArachneResult<Self> {
        let chain_id = manager.provider().chain_id().await?;
        Ok(Self { chain_id, manager })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn manager(&self) -> &DeploymentManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut DeploymentManager {
        &mut self.manager
    }

    /// Look up a deployed contract by alias.
    pub fn contract(&self, alias: &str) -> Option<&ContractHandle> {
        self.manager.contract(alias)
    }

    pub async fn snapshot(&self) -> ArachneResult<SnapshotId> {
        self.manager.provider().snapshot().await
    }

    /// Revert to `snapshot`. The handle is spent afterwards.
    pub async fn revert(&self, snapshot: &SnapshotId) -> ArachneResult<()> {
        if self.manager.provider().revert(snapshot).await? {
            Ok(())
        } else {
            Err(ArachneError::Scenario(format!(
                "snapshot `{snapshot}` unknown or already spent"
            )))
        }
    }
}
