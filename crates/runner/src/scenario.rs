//! Scenario, constraint, and solution types.
//!
//! A constraint declares how to bring the world into states satisfying its
//! precondition (`solve`) and how to verify the precondition holds
//! (`check`). Constraints within one scenario are assumed mutually
//! independent; the runner does not detect conflicts between them.

use crate::world::World;
use arachne_core::ArachneResult;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future used by scenario closures.
pub type DynFuture<'a, T> = Pin<Box<dyn Future<Output = ArachneResult<T>> + Send + 'a>>;

/// One way of mutating state to satisfy one constraint instance. Takes the
/// current context and returns a possibly-new one.
pub type Solution<T> = Arc<dyn for<'a> Fn(T, &'a World) -> DynFuture<'a, T> + Send + Sync>;

/// The no-op solution: returns the context unchanged.
pub fn identity_solution<T: Send + 'static>() -> Solution<T> {
    Arc::new(|context: T, _world: &World| {
        Box::pin(async move { Ok(context) }) as DynFuture<'_, T>
    })
}

/// A precondition over (context, world).
///
/// Scenario-specific requirements are captured in the constraint instance
/// at construction time.
#[async_trait]
pub trait Constraint<T: Send + Sync>: Send + Sync {
    /// Produce zero or more solutions that make this constraint hold.
    /// `None` (or an empty list) means "already holds, nothing to do".
    async fn solve(&self, context: &T, world: &World)
        -> ArachneResult<Option<Vec<Solution<T>>>>;

    /// Verify the constraint holds; errors abort the scenario.
    async fn check(&self, context: &T, world: &World) -> ArachneResult<()>;
}

/// Gas accounting returned by a property that submitted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialReceipt {
    pub gas_used: u64,
}

/// A test case: constraints to satisfy, an initializer building the
/// starting context, and the property to run per solution combination.
pub struct Scenario<T> {
    pub name: String,
    pub constraints: Vec<Arc<dyn Constraint<T>>>,
    pub initializer: Arc<dyn for<'a> Fn(&'a World) -> DynFuture<'a, T> + Send + Sync>,
    /// Optional view transform applied to the context before the property.
    pub transform: Option<Arc<dyn Fn(T) -> T + Send + Sync>>,
    pub property:
        Arc<dyn for<'a> Fn(T, &'a World) -> DynFuture<'a, Option<TrialReceipt>> + Send + Sync>,
}

impl<T: Send + Sync> Scenario<T> {
    pub fn new<I, P>(name: impl Into<String>, initializer: I, property: P) -> Self
    where
        I: for<'a> Fn(&'a World) -> DynFuture<'a, T> + Send + Sync + 'static,
        P: for<'a> Fn(T, &'a World) -> DynFuture<'a, Option<TrialReceipt>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constraints: Vec::new(),
            initializer: Arc::new(initializer),
            transform: None,
            property: Arc::new(property),
        }
    }

    pub fn with_constraint(mut self, constraint: Arc<dyn Constraint<T>>) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}
