//! Domain models, shared types, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod config;
pub mod error;
pub mod types;

pub use config::{RelationConfigMap, RelationEdge, RelationRule};
pub use error::{ArachneError, ArachneResult};
pub use types::{Alias, AliasRender, BuildArtifact, CacheSpec, ContractHandle, SnapshotId};
