//! Constraint-solving scenario runner.
//!
//! Scenarios declare constraints over a [`World`]; the runner solves each
//! constraint into state-mutating solutions, enumerates the Cartesian
//! product of the solution sets, and executes the scenario's property once
//! per combination inside a snapshot/revert bracket.

pub mod report;
pub mod runner;
pub mod scenario;
pub mod world;

pub use report::ScenarioResult;
pub use runner::Runner;
pub use scenario::{identity_solution, Constraint, Scenario, Solution, TrialReceipt};
pub use world::World;
