//! Trial enumeration and execution.

use crate::report::ScenarioResult;
use crate::scenario::{identity_solution, Scenario, Solution};
use crate::world::World;
use arachne_core::{ArachneError, ArachneResult};
use smallvec::SmallVec;
use std::time::Instant;

type Combination = SmallVec<[usize; 8]>;

/// Lazy odometer over index vectors into each constraint's solution list.
///
/// Yields one empty combination when there are no sets, so a scenario
/// without constraints still gets exactly one trial.
struct IndexProduct {
    sizes: Vec<usize>,
    next: Option<Combination>,
}

impl IndexProduct {
    fn new(sizes: Vec<usize>) -> Self {
        // A zero-sized set empties the whole product.
        let next = if sizes.iter().any(|&s| s == 0) {
            None
        } else {
            Some(sizes.iter().map(|_| 0).collect())
        };
        Self { sizes, next }
    }

    fn combinations(&self) -> usize {
        self.sizes.iter().product()
    }
}

impl Iterator for IndexProduct {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let current = self.next.take()?;

        // Odometer increment, least-significant index last.
        let mut bumped = current.clone();
        for i in (0..self.sizes.len()).rev() {
            bumped[i] += 1;
            if bumped[i] < self.sizes[i] {
                self.next = Some(bumped);
                return Some(current);
            }
            bumped[i] = 0;
        }
        // Wrapped all the way around: this was the last combination.
        Some(current)
    }
}

/// Executes scenarios: solve, enumerate, trial, revert.
#[derive(Debug, Clone)]
pub struct Runner {
    /// Hard bound on the solution product; exceeding it is an error rather
    /// than a silent cap.
    pub max_combinations: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            max_combinations: 10_000,
        }
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_combinations(mut self, max: usize) -> Self {
        self.max_combinations = max;
        self
    }

    /// Run every scenario, isolating failures: one scenario's error does
    /// not stop the rest.
    pub async fn run_all<T>(&self, scenarios: &[Scenario<T>], world: &World) -> Vec<ScenarioResult>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run(scenario, world).await);
        }
        results
    }

    /// Run one scenario to a result; never panics the caller on failure.
    pub async fn run<T>(&self, scenario: &Scenario<T>, world: &World) -> ScenarioResult
    where
        T: Clone + Send + Sync + 'static,
    {
        let started = Instant::now();
        let mut trials = 0usize;
        let mut total_gas = 0u64;
        let mut gas_trials = 0usize;

        let error = self
            .drive(scenario, world, &mut trials, &mut total_gas, &mut gas_trials)
            .await
            .err();

        let elapsed = started.elapsed();
        match &error {
            None => tracing::info!(
                scenario = %scenario.name,
                trials,
                elapsed_ms = elapsed.as_millis() as u64,
                "scenario passed"
            ),
            Some(err) => tracing::error!(
                scenario = %scenario.name,
                trials,
                %err,
                "scenario failed"
            ),
        }

        ScenarioResult::build(&scenario.name, elapsed, trials, total_gas, gas_trials, error)
    }

    /// Snapshot bracket around the whole run: whatever `trials` leaves
    /// outstanding is reverted before returning.
    async fn drive<T>(
        &self,
        scenario: &Scenario<T>,
        world: &World,
        trials: &mut usize,
        total_gas: &mut u64,
        gas_trials: &mut usize,
    ) -> ArachneResult<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut snapshot = world.snapshot().await?;

        let outcome = self
            .trials(scenario, world, &mut snapshot, trials, total_gas, gas_trials)
            .await;

        if let Err(error) = world.revert(&snapshot).await {
            tracing::warn!(%error, scenario = %scenario.name, "final revert failed");
        }
        outcome
    }

    async fn trials<T>(
        &self,
        scenario: &Scenario<T>,
        world: &World,
        snapshot: &mut arachne_core::SnapshotId,
        trials: &mut usize,
        total_gas: &mut u64,
        gas_trials: &mut usize,
    ) -> ArachneResult<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let base = (scenario.initializer)(world).await?;

        // Constraints are independent: solve them jointly.
        let solved = futures::future::try_join_all(
            scenario.constraints.iter().map(|c| c.solve(&base, world)),
        )
        .await?;

        // Leading identity set guarantees at least one trial; an absent or
        // empty solve result becomes a single no-op solution.
        let mut sets: Vec<Vec<Solution<T>>> = vec![vec![identity_solution()]];
        for solutions in solved {
            let mut set = solutions.unwrap_or_default();
            if set.is_empty() {
                set = vec![identity_solution()];
            }
            sets.push(set);
        }

        let product = IndexProduct::new(sets.iter().map(Vec::len).collect());
        let combinations = product.combinations();
        if combinations > self.max_combinations {
            return Err(ArachneError::Scenario(format!(
                "solution product of {combinations} combinations exceeds the {} limit",
                self.max_combinations
            )));
        }
        tracing::debug!(scenario = %scenario.name, combinations, "enumerating trials");

        for combination in product {
            *trials += 1;

            let result = self
                .one_trial(scenario, world, &sets, &combination, base.clone())
                .await;

            // Guaranteed cleanup: revert to the pre-trial snapshot whether
            // the trial passed or not.
            let reverted = world.revert(snapshot).await;

            let receipt = match result {
                Ok(receipt) => receipt,
                Err(error) => {
                    if let Err(revert_error) = reverted {
                        tracing::warn!(%revert_error, "revert after failed trial also failed");
                    }
                    return Err(error);
                }
            };
            reverted?;

            if let Some(receipt) = receipt {
                *total_gas += receipt.gas_used;
                *gas_trials += 1;
            }

            *snapshot = world.snapshot().await?;
        }

        Ok(())
    }

    async fn one_trial<T>(
        &self,
        scenario: &Scenario<T>,
        world: &World,
        sets: &[Vec<Solution<T>>],
        combination: &[usize],
        mut context: T,
    ) -> ArachneResult<Option<crate::scenario::TrialReceipt>>
    where
        T: Clone + Send + Sync + 'static,
    {
        // Apply the chosen solution from every set in order; each may
        // replace the context.
        for (set, &choice) in sets.iter().zip(combination) {
            context = set[choice](context, world).await?;
        }

        // Re-verify every constraint: solutions are not allowed to break
        // each other's preconditions silently.
        for constraint in &scenario.constraints {
            constraint.check(&context, world).await?;
        }

        let view = match &scenario.transform {
            Some(transform) => transform(context),
            None => context,
        };
        (scenario.property)(view, world).await
    }
}
