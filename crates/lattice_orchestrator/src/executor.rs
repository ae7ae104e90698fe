//! Per-job execution (§4.2 "Per-job execution", §9): retries with
//! interruptible exponential backoff, a freshly pinned connection per
//! attempt, parameter injection, and notebook block execution.

use crate::error::OrchestratorError;
use crate::params::{set_statement, validate_parameter_key};
use lattice_db::EnginePool;
use lattice_domain::PipelineJob;
use lattice_repository::PipelineRepository;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of running a job to completion (across all of its retries).
pub enum JobOutcome {
    Success,
    Failed(String),
    Cancelled,
}

/// Run `job` to completion against `pool`, retrying up to `1 +
/// job.retry_count` times with exponential backoff (1s, 2s, 4s, ...)
/// between attempts. `token` is the owning run's lifetime: a cancellation
/// observed at any suspension point (backoff sleep, connection acquire,
/// block execution) ends the job as [`JobOutcome::Cancelled`] without
/// starting a further attempt.
pub async fn execute_job(
    job: &PipelineJob,
    parameters: &BTreeMap<String, String>,
    pool: &EnginePool,
    repo: &dyn PipelineRepository,
    token: &CancellationToken,
    max_identifier_length: usize,
) -> JobOutcome {
    let attempts = 1 + job.retry_count;
    let mut last_error = String::new();

    for attempt in 0..attempts {
        if attempt > 0 {
            let backoff = Duration::from_secs(1u64 << (attempt - 1).min(30));
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = token.cancelled() => return JobOutcome::Cancelled,
            }
        }
        if token.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        match run_one_attempt(job, parameters, pool, repo, token, max_identifier_length).await {
            Ok(()) => return JobOutcome::Success,
            Err(AttemptOutcome::Cancelled) => return JobOutcome::Cancelled,
            Err(AttemptOutcome::Failed(message)) => last_error = message,
        }
    }

    JobOutcome::Failed(last_error)
}

enum AttemptOutcome {
    Failed(String),
    Cancelled,
}

async fn run_one_attempt(
    job: &PipelineJob,
    parameters: &BTreeMap<String, String>,
    pool: &EnginePool,
    repo: &dyn PipelineRepository,
    token: &CancellationToken,
    max_identifier_length: usize,
) -> Result<(), AttemptOutcome> {
    let pinned = tokio::select! {
        acquired = pool.acquire_pinned() => acquired.map_err(|err| AttemptOutcome::Failed(err.to_string()))?,
        _ = token.cancelled() => return Err(AttemptOutcome::Cancelled),
    };

    let result = run_attempt_body(job, parameters, repo, token, max_identifier_length, &pinned).await;
    pinned.release();
    result
}

async fn run_attempt_body(
    job: &PipelineJob,
    parameters: &BTreeMap<String, String>,
    repo: &dyn PipelineRepository,
    token: &CancellationToken,
    max_identifier_length: usize,
    pinned: &lattice_db::PinnedConnection,
) -> Result<(), AttemptOutcome> {
    for (key, value) in parameters {
        validate_parameter_key(key, max_identifier_length)
            .map_err(|err: OrchestratorError| AttemptOutcome::Failed(err.to_string()))?;
        let statement = set_statement(key, value);
        tokio::select! {
            result = pinned.execute_batch(&statement) => {
                result.map_err(|err| AttemptOutcome::Failed(err.to_string()))?;
            }
            _ = token.cancelled() => return Err(AttemptOutcome::Cancelled),
        }
    }

    let blocks = repo
        .notebook_sql_blocks(job)
        .await
        .map_err(|err| AttemptOutcome::Failed(err.to_string()))?;

    for block in blocks {
        tokio::select! {
            result = pinned.execute_batch(&block) => {
                result.map_err(|err| AttemptOutcome::Failed(err.to_string()))?;
            }
            _ = token.cancelled() => return Err(AttemptOutcome::Cancelled),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_db::{DbConnection, EnginePool};
    use lattice_ids::{NotebookId, PipelineId};
    use lattice_repository::memory::MemoryPipelineRepository;

    fn memory_pool() -> EnginePool {
        EnginePool::new(DbConnection::open_duckdb_memory().unwrap(), 1)
    }

    fn job_with_retries(retry_count: u32) -> PipelineJob {
        PipelineJob::new(PipelineId::new(), "j1", NotebookId::new(), 0).with_retry_count(retry_count)
    }

    #[tokio::test]
    async fn succeeds_when_notebook_has_no_blocks() {
        let pool = memory_pool();
        let repo = MemoryPipelineRepository::new();
        let job = job_with_retries(0);
        let token = CancellationToken::new();
        let outcome = execute_job(&job, &BTreeMap::new(), &pool, &repo, &token, 128).await;
        assert!(matches!(outcome, JobOutcome::Success));
    }

    #[tokio::test]
    async fn invalid_parameter_key_fails_without_retry_help() {
        let pool = memory_pool();
        let repo = MemoryPipelineRepository::new();
        let job = job_with_retries(2);
        let token = CancellationToken::new();
        let mut parameters = BTreeMap::new();
        parameters.insert("bad key".to_string(), "x".to_string());
        let outcome = execute_job(&job, &parameters, &pool, &repo, &token, 128).await;
        assert!(matches!(outcome, JobOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn cancellation_before_first_attempt_short_circuits() {
        let pool = memory_pool();
        let repo = MemoryPipelineRepository::new();
        let job = job_with_retries(5);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = execute_job(&job, &BTreeMap::new(), &pool, &repo, &token, 128).await;
        assert!(matches!(outcome, JobOutcome::Cancelled));
    }
}
