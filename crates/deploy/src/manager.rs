//! Idempotent deployment manager.
//!
//! Composes the cache, alias store, spider, and retry layer into the
//! surface migration scripts run against: deploy/import/clone by alias,
//! conditional mutation, recrawl, and forking.

use crate::aliases::AliasStore;
use crate::cache::Cache;
use crate::spider::Spider;
use alloy_primitives::{Address, Bytes};
use arachne_core::{
    Alias, ArachneError, ArachneResult, BuildArtifact, CacheSpec, ContractHandle,
    RelationConfigMap,
};
use arachne_provider::{ArtifactSource, RetryPolicy, StateProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Artifact source that reads through the deployment cache.
struct CachingArtifacts {
    inner: Arc<dyn ArtifactSource>,
    cache: Arc<Mutex<Cache>>,
}

#[async_trait]
impl ArtifactSource for CachingArtifacts {
    async fn artifact_for(
        &self,
        network: &str,
        address: Address,
    ) -> ArachneResult<Option<BuildArtifact>> {
        let spec = CacheSpec::artifact(&address);
        if let Some(artifact) = self.cache.lock().read_cache::<BuildArtifact>(&spec) {
            return Ok(Some(artifact));
        }
        let fetched = self.inner.artifact_for(network, address).await?;
        if let Some(artifact) = &fetched {
            self.cache.lock().store_cache(&spec, artifact)?;
        }
        Ok(fetched)
    }
}

pub struct DeploymentManager {
    network: String,
    deployment: String,
    cache: Arc<Mutex<Cache>>,
    config: RelationConfigMap,
    provider: Arc<dyn StateProvider>,
    artifacts: Arc<dyn ArtifactSource>,
    contracts: BTreeMap<Alias, ContractHandle>,
    aliases: AliasStore,
    proxies: BTreeMap<Alias, Alias>,
    retry_policy: RetryPolicy,
}

impl DeploymentManager {
    pub fn new(
        network: impl Into<String>,
        deployment: impl Into<String>,
        config: RelationConfigMap,
        provider: Arc<dyn StateProvider>,
        artifacts: Arc<dyn ArtifactSource>,
        cache: Cache,
    ) -> ArachneResult<Self> {
        let cache = Arc::new(Mutex::new(cache));
        let aliases = AliasStore::load_aliases(&cache.lock())?;
        let artifacts: Arc<dyn ArtifactSource> = Arc::new(CachingArtifacts {
            inner: artifacts,
            cache: cache.clone(),
        });

        Ok(Self {
            network: network.into(),
            deployment: deployment.into(),
            cache,
            config,
            provider,
            artifacts,
            contracts: BTreeMap::new(),
            aliases,
            proxies: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn provider(&self) -> &Arc<dyn StateProvider> {
        &self.provider
    }

    /// Look up a live handle by alias. Missing is soft.
    pub fn contract(&self, alias: &str) -> Option<&ContractHandle> {
        self.contracts.get(alias)
    }

    pub fn aliases(&self) -> &AliasStore {
        &self.aliases
    }

    pub fn proxies(&self) -> &BTreeMap<Alias, Alias> {
        &self.proxies
    }

    /// Run a remote operation under this manager's retry policy, resetting
    /// signer nonce tracking between attempts.
    pub async fn retry<T, F, Fut>(&self, op: F) -> ArachneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ArachneResult<T>>,
    {
        self.retry_policy
            .run_with_reset(self.provider.as_ref(), op)
            .await
    }

    /// Evaluate `condition`; only if it holds, run `action` under retry.
    ///
    /// Returns `None` when the condition did not hold and the action was
    /// never invoked.
    pub async fn idempotent<C, CFut, A, AFut, T>(
        &self,
        condition: C,
        action: A,
    ) -> ArachneResult<Option<T>>
    where
        C: FnOnce() -> CFut,
        CFut: Future<Output = ArachneResult<bool>>,
        A: FnMut() -> AFut,
        AFut: Future<Output = ArachneResult<T>>,
    {
        if !condition().await? {
            return Ok(None);
        }
        self.retry(action).await.map(Some)
    }

    /// Deploy a contract under `alias`. Idempotent: an existing binding is
    /// returned unchanged unless `force` is set.
    pub async fn deploy(
        &mut self,
        alias: &str,
        artifact: &BuildArtifact,
        args: &[Bytes],
        force: bool,
    ) -> ArachneResult<ContractHandle> {
        if !force {
            if let Some(existing) = self.contracts.get(alias) {
                tracing::debug!(alias, address = %existing.address, "deploy skipped, alias bound");
                return Ok(existing.clone());
            }
        }

        let address = self
            .retry(|| self.provider.deploy_contract(artifact, args))
            .await?;

        self.put_verification_args(address, args)?;
        self.bind(alias, address, artifact, force)
    }

    /// Import an already-deployed contract under `alias`. Idempotent.
    pub async fn existing(&mut self, alias: &str, address: Address) -> ArachneResult<ContractHandle> {
        if let Some(existing) = self.contracts.get(alias) {
            return Ok(existing.clone());
        }

        let artifact = self
            .retry(|| self.artifacts.artifact_for(&self.network, address))
            .await?
            .unwrap_or(BuildArtifact {
                contract: "unknown".into(),
                methods: vec![],
                bytecode: None,
            });

        self.bind(alias, address, &artifact, false)
    }

    /// Deploy a fresh copy of the contract at `source` under `alias`.
    /// Idempotent by alias.
    pub async fn clone_contract(
        &mut self,
        alias: &str,
        source: Address,
        args: &[Bytes],
    ) -> ArachneResult<ContractHandle> {
        if let Some(existing) = self.contracts.get(alias) {
            return Ok(existing.clone());
        }

        let artifact = self
            .retry(|| self.artifacts.artifact_for(&self.network, source))
            .await?
            .ok_or_else(|| {
                ArachneError::Config(format!("no artifact for clone source {source:#x}"))
            })?;

        let address = self
            .retry(|| self.provider.deploy_contract(&artifact, args))
            .await?;

        self.put_verification_args(address, args)?;
        self.bind(alias, address, &artifact, false)
    }

    fn bind(
        &mut self,
        alias: &str,
        address: Address,
        artifact: &BuildArtifact,
        force: bool,
    ) -> ArachneResult<ContractHandle> {
        if force {
            self.aliases.force_set(alias, address);
        } else {
            self.aliases.set(alias, address)?;
        }

        let handle = ContractHandle::new(alias, address, artifact);
        self.contracts.insert(alias.to_string(), handle.clone());

        // Deployed/imported contracts become crawl roots so later spider
        // runs rediscover them.
        let mut cache = self.cache.lock();
        let mut roots: Vec<(Alias, Address)> =
            cache.read_cache(&CacheSpec::roots()).unwrap_or_default();
        match roots.iter_mut().find(|(a, _)| a == alias) {
            Some(entry) if entry.1 != address => entry.1 = address,
            Some(_) => {}
            None => roots.push((alias.to_string(), address)),
        }
        cache.store_cache(&CacheSpec::roots(), &roots)?;
        self.aliases.store_aliases(&mut cache)?;

        tracing::info!(alias, %address, contract = %artifact.contract, "bound");
        Ok(handle)
    }

    /// Rebuild the alias/proxy/contract maps by recrawling persisted roots
    /// plus everything deployed through this manager, then persist the
    /// refreshed maps.
    pub async fn spider(&mut self) -> ArachneResult<()> {
        let mut roots: BTreeMap<Alias, Address> = self
            .cache
            .lock()
            .read_cache::<Vec<(Alias, Address)>>(&CacheSpec::roots())
            .unwrap_or_default()
            .into_iter()
            .collect();
        for (alias, handle) in &self.contracts {
            roots.entry(alias.clone()).or_insert(handle.address);
        }

        let spider = Spider::new(
            self.network.clone(),
            self.provider.clone(),
            self.artifacts.clone(),
            self.config.clone(),
        );
        let report = spider.crawl(&roots).await?;

        {
            let mut cache = self.cache.lock();
            report.aliases.store_aliases(&mut cache)?;
            cache.store_cache(&CacheSpec::proxies(), &report.proxies)?;
        }

        self.aliases = report.aliases;
        self.proxies = report.proxies;
        self.contracts = report.contracts;
        Ok(())
    }

    /// Fork this manager: deep-copied cache and contract map, shared
    /// provider. Mutations in the fork never reach the original.
    pub fn fork(&self) -> Self {
        let cache = Arc::new(Mutex::new(self.cache.lock().fork()));
        let artifacts: Arc<dyn ArtifactSource> = Arc::new(CachingArtifacts {
            inner: self.artifacts.clone(),
            cache: cache.clone(),
        });
        Self {
            network: self.network.clone(),
            deployment: self.deployment.clone(),
            cache,
            config: self.config.clone(),
            provider: self.provider.clone(),
            artifacts,
            contracts: self.contracts.clone(),
            aliases: self.aliases.clone(),
            proxies: self.proxies.clone(),
            retry_policy: self.retry_policy.clone(),
        }
    }

    /// Bulk-merge raw cache entries (used when seeding a fork from another
    /// deployment's persisted state).
    pub fn load_memory(&mut self, entries: std::collections::HashMap<String, serde_json::Value>) {
        self.cache.lock().load_memory(entries);
    }

    // -- migration artifacts and verification args -------------------------

    pub fn store_artifact<T: Serialize>(
        &self,
        migration: &str,
        name: &str,
        value: &T,
    ) -> ArachneResult<()> {
        self.cache
            .lock()
            .store_cache(&CacheSpec::migration(migration, name), value)
    }

    pub fn read_artifact<T: DeserializeOwned>(&self, migration: &str, name: &str) -> Option<T> {
        self.cache
            .lock()
            .read_cache(&CacheSpec::migration(migration, name))
    }

    pub fn put_verification_args(&self, address: Address, args: &[Bytes]) -> ArachneResult<()> {
        self.cache
            .lock()
            .store_cache(&CacheSpec::verification(&address), &args.to_vec())
    }

    /// Read and clear the pending verification args for `address`.
    pub fn take_verification_args(&self, address: Address) -> Option<Vec<Bytes>> {
        let spec = CacheSpec::verification(&address);
        let mut cache = self.cache.lock();
        let args = cache.read_cache::<Vec<Bytes>>(&spec)?;
        cache.remove(&spec);
        Some(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arachne_core::{RelationEdge, RelationRule};
    use arachne_provider::MockChain;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn artifact(contract: &str, methods: &[&str]) -> BuildArtifact {
        BuildArtifact {
            contract: contract.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            bytecode: None,
        }
    }

    fn manager(chain: &Arc<MockChain>, config: RelationConfigMap) -> DeploymentManager {
        DeploymentManager::new(
            "test",
            "usdc",
            config,
            chain.clone(),
            chain.clone(),
            Cache::new(),
        )
        .unwrap()
        .with_retry_policy(
            RetryPolicy::default().with_wait(std::time::Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn deploy_is_idempotent_by_alias() {
        let chain = Arc::new(MockChain::new());
        let mut dm = manager(&chain, RelationConfigMap::new());
        let art = artifact("Timelock", &["delay"]);

        let first = dm.deploy("timelock", &art, &[], false).await.unwrap();
        let second = dm.deploy("timelock", &art, &[], false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chain.deploys(), 1);
    }

    #[tokio::test]
    async fn force_deploy_rebinds_to_a_fresh_address() {
        let chain = Arc::new(MockChain::new());
        let mut dm = manager(&chain, RelationConfigMap::new());
        let art = artifact("Timelock", &[]);

        let first = dm.deploy("timelock", &art, &[], false).await.unwrap();
        let second = dm.deploy("timelock", &art, &[], true).await.unwrap();

        assert_ne!(first.address, second.address);
        assert_eq!(chain.deploys(), 2);
        assert_eq!(dm.aliases().get("timelock"), Some(second.address));
        assert_eq!(dm.contract("timelock"), Some(&second));
    }

    #[tokio::test]
    async fn existing_imports_without_deploying() {
        let chain = Arc::new(MockChain::new());
        let addr = MockChain::test_address(5);
        chain.add_contract(addr, artifact("Token", &["transfer"]));

        let mut dm = manager(&chain, RelationConfigMap::new());
        let handle = dm.existing("usdc", addr).await.unwrap();

        assert_eq!(handle.address, addr);
        assert_eq!(handle.contract, "Token");
        assert_eq!(chain.deploys(), 0);
        assert_eq!(dm.contract("usdc"), Some(&handle));
    }

    #[tokio::test]
    async fn clone_deploys_a_copy_of_the_source() {
        let chain = Arc::new(MockChain::new());
        let source = MockChain::test_address(6);
        chain.add_contract(source, artifact("Comet", &["supply"]));

        let mut dm = manager(&chain, RelationConfigMap::new());
        let handle = dm.clone_contract("comet-copy", source, &[]).await.unwrap();

        assert_ne!(handle.address, source);
        assert_eq!(handle.contract, "Comet");
        assert_eq!(chain.deploys(), 1);
    }

    #[tokio::test]
    async fn idempotent_skips_action_when_condition_is_false() {
        let chain = Arc::new(MockChain::new());
        let dm = manager(&chain, RelationConfigMap::new());
        let ran = AtomicU32::new(0);

        let result = dm
            .idempotent(
                || async { Ok(false) },
                || async {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn idempotent_runs_action_exactly_once_when_condition_holds() {
        let chain = Arc::new(MockChain::new());
        let dm = manager(&chain, RelationConfigMap::new());
        let ran = AtomicU32::new(0);

        let result = dm
            .idempotent(
                || async { Ok(true) },
                || async {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(9u32)
                },
            )
            .await
            .unwrap();

        assert_eq!(result, Some(9));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idempotent_retries_transient_action_failures() {
        let chain = Arc::new(MockChain::new());
        let dm = manager(&chain, RelationConfigMap::new());
        let ran = AtomicU32::new(0);

        let result = dm
            .idempotent(
                || async { Ok(true) },
                || {
                    let n = ran.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(ArachneError::Provider("flaky".into()))
                        } else {
                            Ok(n)
                        }
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn spider_makes_deployed_contracts_discoverable() {
        let chain = Arc::new(MockChain::new());
        let mut config = RelationConfigMap::new();
        config.insert(
            "Comet".into(),
            RelationRule {
                relations: vec![RelationEdge::new("getAssets", "asset")],
                ..Default::default()
            },
        );

        let mut dm = manager(&chain, config);
        let comet = dm
            .deploy("comet", &artifact("Comet", &["supply"]), &[], false)
            .await
            .unwrap();

        // A collaborator the deploy scripts never bound directly.
        let asset = MockChain::test_address(7);
        chain.add_contract(asset, artifact("Token", &[]));
        chain.set_address_field(comet.address, "getAssets", vec![asset]);

        dm.spider().await.unwrap();

        assert_eq!(dm.aliases().get("comet"), Some(comet.address));
        assert_eq!(dm.aliases().get("asset"), Some(asset));
        assert!(dm.contract("asset").is_some());
    }

    #[tokio::test]
    async fn fork_is_isolated_from_original() {
        let chain = Arc::new(MockChain::new());
        let mut dm = manager(&chain, RelationConfigMap::new());
        dm.deploy("timelock", &artifact("Timelock", &[]), &[], false)
            .await
            .unwrap();

        let mut fork = dm.fork();
        fork.deploy("governor", &artifact("Governor", &[]), &[], false)
            .await
            .unwrap();

        assert!(fork.contract("timelock").is_some());
        assert!(fork.contract("governor").is_some());
        assert!(dm.contract("governor").is_none());
        assert_eq!(dm.aliases().get("governor"), None);
    }

    #[tokio::test]
    async fn verification_args_are_taken_once() {
        let chain = Arc::new(MockChain::new());
        let mut dm = manager(&chain, RelationConfigMap::new());
        let args = vec![Bytes::from_static(&[0u8; 32])];
        let handle = dm
            .deploy("comet", &artifact("Comet", &[]), &args, false)
            .await
            .unwrap();

        assert_eq!(dm.take_verification_args(handle.address), Some(args));
        assert_eq!(dm.take_verification_args(handle.address), None);
    }

    #[tokio::test]
    async fn migration_artifacts_round_trip() {
        let chain = Arc::new(MockChain::new());
        let dm = manager(&chain, RelationConfigMap::new());

        dm.store_artifact("1699_init", "proposal", &vec![1u64, 2, 3])
            .unwrap();
        assert_eq!(
            dm.read_artifact::<Vec<u64>>("1699_init", "proposal"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(dm.read_artifact::<Vec<u64>>("1699_init", "missing"), None);
    }
}
