//! Batch executor: staged, bounded-concurrency execution of operations.
//!
//! Operations are grouped into stages by [`plan_stages`]. Within a stage at
//! most `concurrency` operations are in flight; a stage only starts once
//! every operation of the previous stage has reached a terminal outcome.
//!
//! # Retry Strategy
//!
//! Each attempt runs under its own timeout. Failures are classified by the
//! remote store:
//! - transient (network, timeout, 408/429/5xx) → retry with exponential
//!   backoff: `base`, `2·base`, `4·base`, … capped at `max_delay`
//! - permanent (other 4xx, validation) → fail immediately
//!
//! After `max_attempts` attempts a transient failure becomes the
//! operation's terminal outcome. Either way the stage carries on: one
//! failed article never blocks its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use corpus_sync_core::error::RemoteError;
use corpus_sync_core::models::{OperationResult, Outcome, SyncOperation};
use corpus_sync_core::remote::RemoteStore;
use corpus_sync_core::stage::{plan_stages, Stage};

/// Attempt limits and backoff schedule for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt; expiry counts as a transient failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// The last error seen once retrying stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    pub error: RemoteError,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
pub async fn retry<F, Fut, T>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(r) => r,
            Err(_) => Err(RemoteError::Transient(format!(
                "timed out after {:?}",
                policy.attempt_timeout
            ))),
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    op = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "transient failure, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(RetryError {
                    error: err,
                    attempts: attempt,
                })
            }
        }
    }
}

/// Executes operations against a [`RemoteStore`] stage by stage.
pub struct BatchExecutor {
    remote: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl BatchExecutor {
    pub fn new(remote: Arc<dyn RemoteStore>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            remote,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Execute a diff-ordered operation list.
    ///
    /// Yields exactly one [`OperationResult`] per operation. Results within
    /// a stage arrive in completion order; all results of a stage arrive
    /// before any result of the next.
    pub fn execute(&self, operations: Vec<SyncOperation>) -> BoxStream<'_, OperationResult> {
        stream::iter(plan_stages(operations))
            .flat_map(move |stage| self.run_stage(stage))
            .boxed()
    }

    /// Execute one stage with at most `concurrency` operations in flight.
    pub fn run_stage(&self, stage: Stage) -> BoxStream<'_, OperationResult> {
        stream::iter(stage.operations)
            .map(move |op| self.execute_one(op))
            .buffer_unordered(self.concurrency)
            .boxed()
    }

    /// Run a single operation to its terminal outcome.
    pub async fn execute_one(&self, operation: SyncOperation) -> OperationResult {
        let label = operation.to_string();
        let remote: &dyn RemoteStore = self.remote.as_ref();
        let op = &operation;

        let attempt = retry(&label, &self.policy, move || async move {
            match op {
                SyncOperation::Create { node, .. } => remote.create(node).await.map(Some),
                SyncOperation::Update {
                    node, remote_id, ..
                } => remote.update(remote_id, node).await,
                SyncOperation::Delete { remote_id, .. } => {
                    remote.delete(remote_id).await.map(|_| None)
                }
            }
        })
        .await;

        let outcome = match attempt {
            Ok(remote_id) => {
                debug!(op = %label, ?remote_id, "remote operation confirmed");
                Outcome::Success { remote_id }
            }
            Err(RetryError {
                error: RemoteError::Transient(cause),
                attempts,
            }) => {
                warn!(op = %label, attempts, %cause, "giving up after transient failures");
                Outcome::TransientFailure { cause, attempts }
            }
            Err(RetryError {
                error: RemoteError::Permanent(cause),
                ..
            }) => {
                warn!(op = %label, %cause, "remote rejected operation");
                Outcome::PermanentFailure { cause }
            }
        };

        OperationResult { operation, outcome }
    }
}
