//! Deployment-side state: cache, alias store, contract-graph spider, and
//! the idempotent deployment manager composing them.

pub mod aliases;
pub mod cache;
pub mod manager;
pub mod spider;

pub use aliases::AliasStore;
pub use cache::Cache;
pub use manager::DeploymentManager;
pub use spider::{Spider, SpiderReport};
