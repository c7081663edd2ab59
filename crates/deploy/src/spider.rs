//! Contract-graph crawler.
//!
//! Starting from root alias/address pairs, resolves each reachable node's
//! contract type, proxy delegation, and declared relations into a
//! deduplicated alias map, a proxy map, and live contract handles.
//!
//! Recursion is memoized by alias, not by address: a relation cycle through
//! an already-resolved alias short-circuits, while the same address reached
//! under two different aliases is processed once per alias.

use crate::aliases::AliasStore;
use alloy_primitives::Address;
use arachne_core::{
    Alias, AliasRender, ArachneError, ArachneResult, BuildArtifact, ContractHandle,
    RelationConfigMap,
};
use arachne_provider::{ArtifactSource, StateProvider};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One unit of crawl work: an address paired with the alias template and
/// occurrence index it was discovered under.
#[derive(Debug, Clone)]
pub struct ContractGraphNode {
    pub address: Address,
    pub render: AliasRender,
}

/// Result of one crawl: alias bindings, proxy -> delegate edges, and the
/// live handles keyed by alias.
#[derive(Debug, Default)]
pub struct SpiderReport {
    pub aliases: AliasStore,
    pub proxies: BTreeMap<Alias, Alias>,
    pub contracts: BTreeMap<Alias, ContractHandle>,
}

#[derive(Default)]
struct CrawlState {
    aliases: AliasStore,
    proxies: BTreeMap<Alias, Alias>,
    contracts: BTreeMap<Alias, ContractHandle>,
    /// Traversal-wide context keyed by relation template. Shared across
    /// sibling and descendant calls so later siblings see (and continue
    /// the occurrence numbering of) earlier discoveries.
    related: HashMap<String, Vec<ContractHandle>>,
}

pub struct Spider {
    network: String,
    provider: Arc<dyn StateProvider>,
    artifacts: Arc<dyn ArtifactSource>,
    config: RelationConfigMap,
}

impl Spider {
    pub fn new(
        network: impl Into<String>,
        provider: Arc<dyn StateProvider>,
        artifacts: Arc<dyn ArtifactSource>,
        config: RelationConfigMap,
    ) -> Self {
        Self {
            network: network.into(),
            provider,
            artifacts,
            config,
        }
    }

    /// Crawl the contract graph reachable from `roots`.
    pub async fn crawl(&self, roots: &BTreeMap<Alias, Address>) -> ArachneResult<SpiderReport> {
        let mut state = CrawlState::default();

        for (alias, address) in roots {
            let node = ContractGraphNode {
                address: *address,
                render: AliasRender::root(alias.clone()),
            };
            self.visit(&mut state, node).await?;
        }

        tracing::info!(
            aliases = state.aliases.len(),
            proxies = state.proxies.len(),
            contracts = state.contracts.len(),
            "crawl complete"
        );

        Ok(SpiderReport {
            aliases: state.aliases,
            proxies: state.proxies,
            contracts: state.contracts,
        })
    }

    /// Resolve one node, recursing into its delegates and relations.
    ///
    /// Returns the node's live handle, or `None` for plain accounts.
    fn visit<'s, 'c>(
        &'s self,
        st: &'c mut CrawlState,
        node: ContractGraphNode,
    ) -> BoxFuture<'c, ArachneResult<Option<ContractHandle>>>
    where
        's: 'c,
    {
        Box::pin(async move {
            let address = node.address;
            let template_rule = self.config.get(&node.render.template).cloned();
            let is_contract = self.provider.is_contract(address).await?;

            if !is_contract {
                if template_rule.is_some() {
                    return Err(ArachneError::Config(format!(
                        "relation config exists for `{}` but {address:#x} holds no code",
                        node.render.template
                    )));
                }
                let alias = node.render.render();
                st.aliases.set(&alias, address)?;
                tracing::debug!(%alias, %address, "aliased plain account");
                return Ok(None);
            }

            // Unconfigured contracts fall back to the artifact source's
            // reported contract type as an implicit config key.
            let artifact = self.artifacts.artifact_for(&self.network, address).await?;
            let rule = template_rule
                .or_else(|| {
                    artifact
                        .as_ref()
                        .and_then(|a| self.config.get(&a.contract).cloned())
                })
                .unwrap_or_default();

            // Canonical alias: an on-chain alias field wins over the render.
            let alias = match &rule.alias_field {
                Some(field) => self.provider.read_text_field(address, field).await?,
                None => node.render.render(),
            };

            // Memoization by alias terminates cycles and diamond graphs.
            if let Some(bound) = st.aliases.get(&alias) {
                if bound == address {
                    tracing::trace!(%alias, "already crawled");
                    return Ok(st.contracts.get(&alias).cloned());
                }
                return Err(ArachneError::Config(format!(
                    "alias `{alias}` already bound to {bound:#x}, cannot rebind to {address:#x}"
                )));
            }
            st.aliases.set(&alias, address)?;

            let artifact = artifact.unwrap_or(BuildArtifact {
                contract: "unknown".into(),
                methods: vec![],
                bytecode: None,
            });
            let mut handle = ContractHandle::new(alias.clone(), address, &artifact);
            tracing::debug!(%alias, %address, contract = %handle.contract, "crawled contract");

            // Delegates: crawl each, union its method table into the proxy's
            // handle, and record the proxy edge.
            for edge in &rule.delegates {
                let targets = self
                    .provider
                    .read_address_field(address, &edge.field)
                    .await?;
                for (i, target) in targets.into_iter().enumerate() {
                    let child = ContractGraphNode {
                        address: target,
                        render: AliasRender::new(edge.template.clone(), i),
                    };
                    if let Some(delegate) = self.visit(&mut *st, child).await? {
                        handle.absorb_methods(&delegate);
                        st.proxies.insert(alias.clone(), delegate.alias.clone());
                    }
                }
            }

            st.contracts.insert(alias.clone(), handle.clone());

            // Sub-relations: occurrence numbering continues from whatever
            // the shared context already holds under this template.
            for edge in &rule.relations {
                let targets = self
                    .provider
                    .read_address_field(address, &edge.field)
                    .await?;
                for target in targets {
                    let index = st.related.get(&edge.template).map_or(0, Vec::len);
                    let child = ContractGraphNode {
                        address: target,
                        render: AliasRender::new(edge.template.clone(), index),
                    };
                    if let Some(found) = self.visit(&mut *st, child).await? {
                        st.related
                            .entry(edge.template.clone())
                            .or_default()
                            .push(found);
                    }
                }
            }

            Ok(Some(handle))
        })
    }
}
