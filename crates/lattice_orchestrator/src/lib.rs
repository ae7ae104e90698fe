//! DAG pipeline orchestrator for the Lattice control plane.
//!
//! Computes execution levels from a pipeline's job graph, runs each level's
//! jobs against the embedded engine with retry/backoff, and tracks Run /
//! Job Run status through a [`lattice_repository::PipelineRepository`].
//! A cron dispatcher fires scheduled pipelines on their own interval loop.

pub mod cancel_registry;
pub mod dag;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod params;

pub use cancel_registry::RunCancelRegistry;
pub use dag::{resolve_execution_order, ExecutionLevels};
pub use dispatcher::CronDispatcher;
pub use error::OrchestratorError;
pub use executor::{execute_job, JobOutcome};

use lattice_db::EnginePool;
use lattice_domain::{
    CoreConfig, JobRunStatus, PipelineJob, PipelineJobRun, PipelineRun, RunStatus, TriggerType,
};
use lattice_ids::RunId;
use lattice_repository::PipelineRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The orchestrator's public contract (§4.2): `trigger` starts a run
/// asynchronously and returns immediately; `cancel_run` signals a run's
/// lifetime and finalizes its persisted state.
pub struct Orchestrator {
    repo: Arc<dyn PipelineRepository>,
    pool: Arc<EnginePool>,
    cancel_registry: Arc<RunCancelRegistry>,
    config: CoreConfig,
}

impl Orchestrator {
    pub fn new(repo: Arc<dyn PipelineRepository>, pool: Arc<EnginePool>, config: CoreConfig) -> Self {
        Self {
            repo,
            pool,
            cancel_registry: Arc::new(RunCancelRegistry::new()),
            config,
        }
    }

    /// Implements the trigger contract of §4.2: fetch, admit, validate,
    /// persist atomically, then hand the run to a detached execution loop.
    pub async fn trigger(
        &self,
        principal: &str,
        pipeline_name: &str,
        parameters: BTreeMap<String, String>,
        trigger_type: TriggerType,
    ) -> Result<RunId, OrchestratorError> {
        let pipeline = self
            .repo
            .get_pipeline_by_name(pipeline_name)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(pipeline_name.to_string()))?;

        let active = self.repo.count_active_runs(&pipeline.id).await?;
        if active >= pipeline.concurrency_limit {
            return Err(OrchestratorError::ConcurrencyExhausted {
                pipeline: pipeline.name.clone(),
                active,
                limit: pipeline.concurrency_limit,
            });
        }

        let jobs = self.repo.list_jobs(&pipeline.id).await?;
        if jobs.is_empty() {
            return Err(OrchestratorError::EmptyPipeline);
        }
        let levels = dag::resolve_execution_order(&jobs)?;

        let run = PipelineRun::new(pipeline.id.clone(), trigger_type, principal, parameters);
        let job_runs: Vec<PipelineJobRun> = jobs
            .iter()
            .map(|job| PipelineJobRun::pending(run.id.clone(), job.id.clone(), job.name.clone()))
            .collect();
        self.repo.create_run_with_job_runs(run.clone(), job_runs).await?;

        let run_id = run.id.clone();
        let token = self.cancel_registry.register(run_id.clone()).await;
        info!(run_id = %run_id, pipeline = %pipeline.name, "pipeline run triggered");

        let repo = Arc::clone(&self.repo);
        let pool = Arc::clone(&self.pool);
        let cancel_registry = Arc::clone(&self.cancel_registry);
        let max_identifier_length = self.config.max_identifier_length;
        tokio::spawn(async move {
            run_execution_loop(repo, pool, run, jobs, levels, token, max_identifier_length).await;
            cancel_registry.remove(&run_id).await;
        });

        Ok(run_id)
    }

    /// Implements `CancelRun` (§4.2): signal the lifetime, then atomically
    /// finalize the Run and any still-PENDING Job Runs.
    pub async fn cancel_run(&self, run_id: &RunId, principal: &str) -> Result<(), OrchestratorError> {
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(run_id.to_string()))?;
        if run.status.is_terminal() {
            return Err(OrchestratorError::InvalidState(
                "run is already in a terminal state".to_string(),
            ));
        }

        self.cancel_registry.cancel(run_id).await;
        self.repo
            .update_run_status(
                run_id,
                RunStatus::Cancelled,
                Some(format!("cancelled by {principal}")),
            )
            .await?;
        self.repo
            .transition_pending_job_runs(run_id, JobRunStatus::Cancelled)
            .await?;
        Ok(())
    }
}

/// The execution loop of §4.2: mark RUNNING, walk levels in order,
/// propagating failure/cancellation to every remaining job, then finalize.
async fn run_execution_loop(
    repo: Arc<dyn PipelineRepository>,
    pool: Arc<EnginePool>,
    run: PipelineRun,
    jobs: Vec<PipelineJob>,
    levels: ExecutionLevels,
    token: CancellationToken,
    max_identifier_length: usize,
) {
    if let Err(err) = repo.mark_run_started(&run.id).await {
        warn!(run_id = %run.id, error = %err, "failed to mark run started");
    }

    let job_runs = match repo.list_job_runs(&run.id).await {
        Ok(job_runs) => job_runs,
        Err(err) => {
            warn!(run_id = %run.id, error = %err, "failed to list job runs, aborting execution loop");
            return;
        }
    };
    let job_run_by_name: BTreeMap<&str, &PipelineJobRun> =
        job_runs.iter().map(|jr| (jr.job_name.as_str(), jr)).collect();
    let job_by_name: BTreeMap<&str, &PipelineJob> = jobs.iter().map(|job| (job.name.as_str(), job)).collect();

    let mut run_failed = false;

    for level in &levels {
        if run_failed || token.is_cancelled() {
            let skip_status = if token.is_cancelled() {
                JobRunStatus::Cancelled
            } else {
                JobRunStatus::Skipped
            };
            if let Err(err) = repo.transition_pending_job_runs(&run.id, skip_status).await {
                warn!(run_id = %run.id, error = %err, "failed to skip remaining job runs");
            }
            break;
        }

        let mut level_failed = false;
        for job_name in level {
            let Some(job) = job_by_name.get(job_name.as_str()).copied() else {
                continue;
            };
            let Some(job_run) = job_run_by_name.get(job_name.as_str()).copied() else {
                continue;
            };

            if token.is_cancelled() {
                let _ = repo
                    .update_job_run_status(&job_run.id, JobRunStatus::Cancelled, None)
                    .await;
                run_failed = true;
                continue;
            }
            if level_failed {
                let _ = repo
                    .update_job_run_status(&job_run.id, JobRunStatus::Skipped, None)
                    .await;
                continue;
            }

            let _ = repo.mark_job_run_started(&job_run.id).await;
            let outcome = execute_job(
                job,
                &run.parameters,
                &pool,
                repo.as_ref(),
                &token,
                max_identifier_length,
            )
            .await;

            match outcome {
                JobOutcome::Success => {
                    let _ = repo
                        .update_job_run_status(&job_run.id, JobRunStatus::Success, None)
                        .await;
                }
                JobOutcome::Failed(message) => {
                    warn!(run_id = %run.id, job = %job_name, error = %message, "job failed");
                    let _ = repo
                        .update_job_run_status(&job_run.id, JobRunStatus::Failed, Some(message))
                        .await;
                    level_failed = true;
                    run_failed = true;
                }
                JobOutcome::Cancelled => {
                    let _ = repo
                        .update_job_run_status(&job_run.id, JobRunStatus::Cancelled, None)
                        .await;
                    run_failed = true;
                }
            }
        }
    }

    let final_status = if token.is_cancelled() {
        RunStatus::Cancelled
    } else if run_failed {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };
    let error_message = match final_status {
        RunStatus::Failed => Some("one or more jobs failed".to_string()),
        RunStatus::Cancelled => Some("run was cancelled".to_string()),
        _ => None,
    };
    info!(run_id = %run.id, status = ?final_status, "pipeline run finished");
    if let Err(err) = repo.mark_run_finished(&run.id, final_status, error_message).await {
        warn!(run_id = %run.id, error = %err, "failed to persist final run status");
    }
}
