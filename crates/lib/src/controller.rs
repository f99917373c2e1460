//! Controller: validated request -> invocation -> time-bounded run -> classified outcome.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::command::{BuildError, CommandBuilder};
use crate::config::Config;
use crate::exec::{CommandRunner, SpawnError};
use crate::locks::TargetLocks;
use crate::operation::{OperationRequest, ValidationError};
use crate::outcome::{classify, FailureCause, Outcome};

/// Errors that stop a request before an outcome exists.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl OperationError {
    /// Caller mistakes (body, fields) as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OperationError::InvalidBody(_) | OperationError::Validation(_)
        )
    }
}

/// Shared by all request handlers. Config is read-only for the controller's lifetime.
pub struct Controller {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    locks: Option<TargetLocks>,
    permits: Option<Semaphore>,
}

impl Controller {
    pub fn new(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Self {
        let locks = config.execution.serialize_targets.then(TargetLocks::new);
        let permits = config.execution.max_concurrent.map(Semaphore::new);
        Self {
            config,
            runner,
            locks,
            permits,
        }
    }

    /// Run one operation. Exactly one runner call on success of building; no retries.
    /// Time spent queued behind other operations counts against the deadline.
    pub async fn execute(&self, request: &OperationRequest) -> Result<Outcome, OperationError> {
        let kind = request.kind();
        let invocation = CommandBuilder::new(&self.config.network)
            .build(request)
            .map_err(|e| {
                log::error!("{}: cannot build command: {}", kind, e);
                e
            })?;
        let deadline = self.config.timeouts.for_kind(kind);

        let queued = Instant::now();
        let admitted = tokio::time::timeout(deadline, async {
            let target = match (&self.locks, request.target_key()) {
                (Some(locks), Some(key)) => {
                    log::debug!("{}: waiting for target lock {}", kind, key);
                    Some(locks.acquire(&key).await)
                }
                _ => None,
            };
            let permit = match &self.permits {
                // the semaphore is never closed, so acquire only fails on a programming error
                Some(s) => s.acquire().await.ok(),
                None => None,
            };
            (target, permit)
        })
        .await;
        let Ok((_target, _permit)) = admitted else {
            log::error!("{}: timed out after {:?} waiting to run", kind, deadline);
            return Ok(Outcome::Failure {
                message: format!(
                    "Error: operation timed out after {:?} waiting for earlier operations to finish",
                    deadline
                ),
                cause: FailureCause::Timeout,
            });
        };
        let remaining = deadline.saturating_sub(queued.elapsed());

        log::info!("{}: running {} (timeout {:?})", kind, invocation, remaining);
        let result = self.runner.run(&invocation, remaining).await.map_err(|e| {
            log::error!("{}: {}", kind, e);
            e
        })?;
        log::debug!("{}: output after {:?}:\n{}", kind, result.elapsed, result.output);

        let outcome = classify(&result.exit, &result.output);
        match &outcome {
            Outcome::Success { .. } => {
                log::info!("{}: succeeded in {:?}", kind, result.elapsed)
            }
            Outcome::Failure { cause, .. } => {
                log::error!("{}: failed ({:?}) after {:?}", kind, cause, result.elapsed)
            }
        }
        Ok(outcome)
    }
}
