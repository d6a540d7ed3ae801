//! The stage execution contract, fallback machinery, and bounded fan-out.
//!
//! Every concrete pipeline supplies stage logic and an optional fallback
//! through [`StageExecutor`]; the control flow (fan-out limits, per-call
//! timeouts, degrade-to-fallback, fatal tagging) lives here and is shared
//! by all pipelines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::warn;

use stagehand_shared::{ExecutionConfig, PipelineInput, StageFailure, StageOutput};
use stagehand_store::StageOutputs;

use crate::collaborators::CollaboratorError;
use crate::spec::StageDef;

// ---------------------------------------------------------------------------
// Context & errors
// ---------------------------------------------------------------------------

/// Read-only context handed to each stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub session_id: String,
    /// The input the session was created with.
    pub input: PipelineInput,
    /// Extra context supplied by `update`; `None` on initial generation.
    pub extra: Option<String>,
    /// Fan-out and timeout limits for sub-calls within the stage.
    pub exec: ExecutionConfig,
}

/// Failure of a stage's primary path, before fallback is consulted.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<CollaboratorError> for StageError {
    fn from(err: CollaboratorError) -> Self {
        Self::new(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// StageExecutor contract
// ---------------------------------------------------------------------------

/// One discrete, ordered unit of a pipeline.
///
/// `execute` may fan out several concurrent sub-calls (use [`fan_out`]) and
/// must apply the partial-result policy internally: drop failed sub-calls,
/// proceed with the successful subset, and fail only when nothing usable
/// remains.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &StageContext,
        prior: &StageOutputs,
    ) -> Result<StageOutput, StageError>;

    /// Deterministic substitute built only from already-known local data.
    /// `None` (the default) declares the stage has no viable fallback.
    fn fallback(&self, _ctx: &StageContext, _prior: &StageOutputs) -> Option<StageOutput> {
        None
    }
}

/// Run one stage with the declared fallback policy applied.
///
/// A primary failure with a viable fallback degrades to the fallback payload
/// and counts as success; without one, the failure is tagged with the stage
/// that produced it and bubbles up as fatal.
pub async fn run_stage(
    def: &StageDef,
    ctx: &StageContext,
    prior: &StageOutputs,
) -> Result<StageOutput, StageFailure> {
    match def.executor.execute(ctx, prior).await {
        Ok(output) => Ok(output),
        Err(err) => match def.executor.fallback(ctx, prior) {
            Some(output) => {
                warn!(
                    stage = %def.name,
                    error = %err,
                    "stage primary failed, degrading to fallback"
                );
                Ok(output)
            }
            None => Err(StageFailure::new(def.kind, def.name, err.message)),
        },
    }
}

// ---------------------------------------------------------------------------
// Bounded fan-out
// ---------------------------------------------------------------------------

/// Run sub-calls concurrently with bounded parallelism and a per-call
/// timeout, joining all results in input order.
///
/// A timed-out sub-call is returned as a failed sub-call; callers apply the
/// partial-result policy over the returned vector.
pub async fn fan_out<T, Fut>(
    tasks: Vec<Fut>,
    limit: usize,
    timeout: Duration,
) -> Vec<Result<T, StageError>>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, StageError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let sem = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            match tokio::time::timeout(timeout, task).await {
                Ok(result) => result,
                Err(_) => Err(StageError::new(format!(
                    "sub-call timed out after {timeout:?}"
                ))),
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => results.push(Err(StageError::new(format!("sub-call panicked: {e}")))),
        }
    }
    results
}
