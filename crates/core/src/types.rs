//! Domain types for the Arachne deployment toolkit.

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

/// Human-readable name bound to exactly one on-chain address within a
/// deployment namespace.
pub type Alias = String;

/// A template string plus an occurrence index, used to derive a concrete
/// alias when several addresses are discovered under the same relation key.
///
/// Index `0` renders bare (`oracle`); later occurrences render suffixed
/// (`oracle:1`, `oracle:2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasRender {
    pub template: String,
    pub index: usize,
}

impl AliasRender {
    pub fn new(template: impl Into<String>, index: usize) -> Self {
        Self {
            template: template.into(),
            index,
        }
    }

    /// A root render: occurrence index 0.
    pub fn root(template: impl Into<String>) -> Self {
        Self::new(template, 0)
    }

    pub fn render(&self) -> Alias {
        if self.index == 0 {
            self.template.clone()
        } else {
            format!("{}:{}", self.template, self.index)
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Opaque snapshot handle returned by the state provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// A build artifact distilled to what the crawler and deployer need: the
/// contract-type name, its method-name set, and optional deploy bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub contract: String,
    pub methods: Vec<String>,
    #[serde(default)]
    pub bytecode: Option<Bytes>,
}

/// A live handle to a discovered or deployed contract.
///
/// `methods` is the handle's capability set. For proxies it is the union of
/// the proxy's own methods and its resolved delegate's, computed once at
/// discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractHandle {
    pub alias: Alias,
    pub address: Address,
    pub contract: String,
    pub methods: BTreeSet<String>,
}

impl ContractHandle {
    pub fn new(alias: impl Into<Alias>, address: Address, artifact: &BuildArtifact) -> Self {
        Self {
            alias: alias.into(),
            address,
            contract: artifact.contract.clone(),
            methods: artifact.methods.iter().cloned().collect(),
        }
    }

    /// Union another handle's method table into this one (proxy + delegate).
    pub fn absorb_methods(&mut self, other: &ContractHandle) {
        for m in &other.methods {
            self.methods.insert(m.clone());
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// A structured key addressing one cached artifact.
///
/// The same spec always resolves to the same relative storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheSpec {
    segments: Vec<String>,
}

impl CacheSpec {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Root alias -> address bindings seeded into the crawler.
    pub fn roots() -> Self {
        Self::new(["roots"])
    }

    /// Full alias -> address bindings discovered by the crawler.
    pub fn aliases() -> Self {
        Self::new(["aliases"])
    }

    /// Proxy alias -> delegate alias bindings.
    pub fn proxies() -> Self {
        Self::new(["proxies"])
    }

    /// Per-address build artifact.
    pub fn artifact(address: &Address) -> Self {
        Self::new(["artifacts".to_string(), format!("{address:#x}")])
    }

    /// Pending contract-verification argument set.
    pub fn verification(address: &Address) -> Self {
        Self::new(["verify".to_string(), format!("{address:#x}")])
    }

    /// Artifact produced by a named migration.
    pub fn migration(migration: &str, artifact: &str) -> Self {
        Self::new(["migrations", migration, artifact])
    }

    /// Relative storage path, stable across invocations.
    pub fn rel_path(&self) -> String {
        self.segments.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_index_zero_is_bare() {
        assert_eq!(AliasRender::root("comet").render(), "comet");
    }

    #[test]
    fn render_nonzero_is_suffixed() {
        assert_eq!(AliasRender::new("oracle", 2).render(), "oracle:2");
    }

    #[test]
    fn cache_spec_path_is_stable() {
        let addr = Address::ZERO;
        assert_eq!(CacheSpec::artifact(&addr), CacheSpec::artifact(&addr));
        assert_eq!(
            CacheSpec::migration("1699999999_init", "deployed").rel_path(),
            "migrations/1699999999_init/deployed"
        );
    }

    #[test]
    fn handle_absorbs_delegate_methods() {
        let proxy_art = BuildArtifact {
            contract: "TransparentProxy".into(),
            methods: vec!["admin".into(), "implementation".into()],
            bytecode: None,
        };
        let impl_art = BuildArtifact {
            contract: "Comet".into(),
            methods: vec!["supply".into(), "withdraw".into()],
            bytecode: None,
        };
        let mut proxy = ContractHandle::new("comet", Address::ZERO, &proxy_art);
        let delegate = ContractHandle::new("comet:implementation", Address::ZERO, &impl_art);
        proxy.absorb_methods(&delegate);

        assert!(proxy.has_method("admin"));
        assert!(proxy.has_method("supply"));
        assert_eq!(proxy.contract, "TransparentProxy");
    }
}
