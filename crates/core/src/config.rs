//! Declarative relation configuration driving the contract-graph crawl.
//!
//! Keys are contract-type names (as reported by the artifact source) or
//! alias templates. The crawler never mutates this configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One discovery edge: an on-chain field to read, and the alias template
/// for whatever addresses it yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub field: String,
    pub template: String,
}

impl RelationEdge {
    pub fn new(field: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            template: template.into(),
        }
    }
}

/// Discovery rules for one contract type or alias template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRule {
    /// On-chain field returning this contract's canonical alias, if any.
    /// Absent means the alias template decides.
    #[serde(default)]
    pub alias_field: Option<String>,

    /// Fields pointing at delegate (proxy implementation) addresses.
    #[serde(default)]
    pub delegates: Vec<RelationEdge>,

    /// Fields enumerating related addresses to recurse into.
    #[serde(default)]
    pub relations: Vec<RelationEdge>,
}

/// Full relation configuration, keyed by contract-type name or template.
pub type RelationConfigMap = BTreeMap<String, RelationRule>;
