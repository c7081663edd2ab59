//! Exponential-backoff retry for remote operations.
//!
//! Every deploy/import/contract-read that talks to a remote endpoint goes
//! through [`RetryPolicy::run`] so transient RPC failures do not surface as
//! hard errors. The backoff loop is iterative and the per-attempt wait is
//! capped at `max_wait` rather than doubling without bound.

use crate::StateProvider;
use arachne_core::{ArachneError, ArachneResult};
use std::future::Future;
use std::time::Duration;

/// Retry budget and backoff shape for one class of remote operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Re-attempts after the first try (5 retries = up to 6 invocations).
    pub retries: u32,
    /// Initial wait before the first re-attempt; doubles per failure.
    pub wait: Duration,
    /// Backoff ceiling.
    pub max_wait: Duration,
    /// Per-attempt timeout. A timed-out attempt counts as a failure.
    pub time_limit: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            wait: Duration::from_millis(250),
            max_wait: Duration::from_secs(8),
            time_limit: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Run `op`, retrying on failure until the budget is exhausted.
    ///
    /// The last underlying error is returned unchanged once `retries`
    /// re-attempts have failed.
    pub async fn run<T, F, Fut>(&self, op: F) -> ArachneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ArachneResult<T>>,
    {
        self.run_inner(None, op).await
    }

    /// Like [`run`](Self::run), but resets signer nonce tracking on the
    /// provider between attempts.
    pub async fn run_with_reset<T, F, Fut>(
        &self,
        provider: &dyn StateProvider,
        op: F,
    ) -> ArachneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ArachneResult<T>>,
    {
        self.run_inner(Some(provider), op).await
    }

    async fn run_inner<T, F, Fut>(
        &self,
        provider: Option<&dyn StateProvider>,
        mut op: F,
    ) -> ArachneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ArachneResult<T>>,
    {
        let mut remaining = self.retries;
        let mut wait = self.wait;

        loop {
            let attempt = match self.time_limit {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(ArachneError::Provider(format!(
                        "operation timed out after {limit:?}"
                    ))),
                },
                None => op().await,
            };

            let err = match attempt {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if remaining == 0 {
                return Err(err);
            }

            tracing::warn!(
                error = %err,
                remaining,
                wait_ms = wait.as_millis() as u64,
                "remote operation failed, retrying"
            );

            if let Some(provider) = provider {
                if let Err(reset_err) = provider.reset_signers().await {
                    tracing::warn!(error = %reset_err, "signer reset failed");
                }
            }

            tokio::time::sleep(wait).await;
            remaining -= 1;
            wait = std::cmp::min(wait * 2, self.max_wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn failing_n_times(n: u32) -> (Arc<AtomicU32>, impl FnMut() -> FailFuture) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let calls = counter.clone();
            let n = n;
            Box::pin(async move {
                let seen = calls.fetch_add(1, Ordering::SeqCst);
                if seen < n {
                    Err(ArachneError::Provider(format!("transient {seen}")))
                } else {
                    Ok(seen + 1)
                }
            }) as FailFuture
        };
        (calls, op)
    }

    type FailFuture =
        std::pin::Pin<Box<dyn Future<Output = ArachneResult<u32>> + Send>>;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_retries(retries)
            .with_wait(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_n_failures() {
        let (calls, op) = failing_n_times(3);
        let result = fast_policy(5).run(op).await.unwrap();
        assert_eq!(result, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_below_failures_returns_last_error() {
        let (calls, op) = failing_n_times(3);
        let err = fast_policy(2).run(op).await.unwrap_err();
        assert!(matches!(err, ArachneError::Provider(msg) if msg == "transient 2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_invokes_once() {
        let (calls, op) = failing_n_times(1);
        fast_policy(0).run(op).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failed_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = fast_policy(1).with_time_limit(Duration::from_millis(50));

        let result = policy
            .run(move || {
                let calls = counter.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        // First attempt hangs past the limit.
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    Ok(7u32)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        let policy = RetryPolicy {
            retries: 6,
            wait: Duration::from_millis(100),
            max_wait: Duration::from_millis(400),
            time_limit: None,
        };
        let (_, op) = failing_n_times(u32::MAX);

        let started = tokio::time::Instant::now();
        policy.run(op).await.unwrap_err();
        // 100 + 200 + 400 + 400 + 400 + 400 = 1900ms, not 100 * (2^6 - 1).
        assert_eq!(started.elapsed(), Duration::from_millis(1900));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_runs_between_attempts() {
        let chain = MockChain::new();
        let (_, op) = failing_n_times(2);
        fast_policy(5).run_with_reset(&chain, op).await.unwrap();
        assert_eq!(chain.signer_resets(), 2);
    }
}
