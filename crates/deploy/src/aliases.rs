//! Alias -> address bindings for one deployment namespace.
//!
//! Insertion order is preserved for deterministic diffing and reporting.
//! Re-binding an alias to the address it already names is a no-op;
//! re-binding to a different address is a fatal configuration error.

use crate::cache::Cache;
use alloy_primitives::Address;
use arachne_core::{Alias, ArachneError, ArachneResult, CacheSpec};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AliasStore {
    pairs: Vec<(Alias, Address)>,
    index: HashMap<Alias, usize>,
}

impl AliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(Alias, Address)>) -> ArachneResult<Self> {
        let mut store = Self::new();
        for (alias, address) in pairs {
            store.set(&alias, address)?;
        }
        Ok(store)
    }

    pub fn get(&self, alias: &str) -> Option<Address> {
        self.index.get(alias).map(|&i| self.pairs[i].1)
    }

    /// Reverse lookup: first alias bound to `address`, in insertion order.
    pub fn alias_of(&self, address: Address) -> Option<&Alias> {
        self.pairs
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(alias, _)| alias)
    }

    pub fn set(&mut self, alias: &str, address: Address) -> ArachneResult<()> {
        if let Some(existing) = self.get(alias) {
            if existing == address {
                return Ok(()); // idempotent re-discovery
            }
            return Err(ArachneError::Config(format!(
                "alias `{alias}` already bound to {existing:#x}, cannot rebind to {address:#x}"
            )));
        }
        self.index.insert(alias.to_string(), self.pairs.len());
        self.pairs.push((alias.to_string(), address));
        Ok(())
    }

    /// Overwrite a binding in place (forced redeploys). Position in the
    /// insertion order is preserved.
    pub fn force_set(&mut self, alias: &str, address: Address) {
        match self.index.get(alias) {
            Some(&i) => self.pairs[i].1 = address,
            None => {
                self.index.insert(alias.to_string(), self.pairs.len());
                self.pairs.push((alias.to_string(), address));
            }
        }
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.index.contains_key(alias)
    }

    /// Insertion-ordered iteration over all bindings.
    pub fn iter(&self) -> impl Iterator<Item = &(Alias, Address)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Full-collection write under the fixed alias cache spec.
    pub fn store_aliases(&self, cache: &mut Cache) -> ArachneResult<()> {
        cache.store_cache(&CacheSpec::aliases(), &self.pairs)
    }

    /// Full-collection read; an absent entry yields an empty store.
    pub fn load_aliases(cache: &Cache) -> ArachneResult<Self> {
        match cache.read_cache::<Vec<(Alias, Address)>>(&CacheSpec::aliases()) {
            Some(pairs) => Self::from_pairs(pairs),
            None => Ok(Self::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Address::from(bytes)
    }

    #[test]
    fn rebind_same_address_is_noop() {
        let mut store = AliasStore::new();
        store.set("comet", addr(1)).unwrap();
        store.set("comet", addr(1)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("comet"), Some(addr(1)));
    }

    #[test]
    fn rebind_different_address_is_fatal() {
        let mut store = AliasStore::new();
        store.set("comet", addr(1)).unwrap();
        let err = store.set("comet", addr(2)).unwrap_err();
        assert!(matches!(err, ArachneError::Config(_)));
        // Original binding survives.
        assert_eq!(store.get("comet"), Some(addr(1)));
    }

    #[test]
    fn force_set_overwrites_in_place() {
        let mut store = AliasStore::new();
        store.set("comet", addr(1)).unwrap();
        store.set("timelock", addr(2)).unwrap();
        store.force_set("comet", addr(3));

        assert_eq!(store.get("comet"), Some(addr(3)));
        let aliases: Vec<&str> = store.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(aliases, vec!["comet", "timelock"]);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut store = AliasStore::new();
        store.set("timelock", addr(3)).unwrap();
        store.set("comet", addr(1)).unwrap();
        store.set("governor", addr(2)).unwrap();

        let aliases: Vec<&str> = store.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(aliases, vec!["timelock", "comet", "governor"]);
    }

    #[test]
    fn reverse_lookup_finds_first_alias() {
        let mut store = AliasStore::new();
        store.set("comet", addr(1)).unwrap();
        store.set("comet-by-another-name", addr(1)).unwrap();
        assert_eq!(store.alias_of(addr(1)).unwrap(), "comet");
        assert!(store.alias_of(addr(9)).is_none());
    }

    #[test]
    fn persists_through_cache() {
        let mut cache = Cache::new();
        let mut store = AliasStore::new();
        store.set("b", addr(2)).unwrap();
        store.set("a", addr(1)).unwrap();
        store.store_aliases(&mut cache).unwrap();

        let loaded = AliasStore::load_aliases(&cache).unwrap();
        let aliases: Vec<&str> = loaded.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(aliases, vec!["b", "a"]);
        assert_eq!(loaded.get("a"), Some(addr(1)));
    }
}
