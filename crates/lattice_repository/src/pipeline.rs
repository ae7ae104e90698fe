//! Pipeline/job/run persistence the orchestrator reads and writes.
//!
//! The orchestrator owns the state machine (§4.2); this trait only
//! persists the records it produces along the way. `count_active_runs` and
//! the atomic "persist Run + all Job Runs in PENDING" step are called out
//! explicitly because the trigger contract depends on both being exact.

use async_trait::async_trait;
use lattice_domain::{CoreError, JobRunStatus, Pipeline, PipelineJob, PipelineJobRun, PipelineRun, RunStatus};
use lattice_ids::{JobRunId, PipelineId, RunId};

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn get_pipeline_by_name(&self, name: &str) -> Result<Option<Pipeline>, CoreError>;
    async fn get_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, CoreError>;
    async fn list_jobs(&self, pipeline_id: &PipelineId) -> Result<Vec<PipelineJob>, CoreError>;

    /// Pipelines with a schedule set and not paused — the cron dispatcher's
    /// registration set.
    async fn list_scheduled(&self) -> Result<Vec<Pipeline>, CoreError>;

    /// Count of runs for `pipeline_id` whose status `is_active()`
    /// (PENDING or RUNNING), consulted against `concurrency_limit` with a
    /// strict `<` before a new trigger is admitted.
    async fn count_active_runs(&self, pipeline_id: &PipelineId) -> Result<u32, CoreError>;

    /// Persist a new Run together with one Job Run per job, all in
    /// PENDING, as a single atomic unit (§4.2's trigger contract: "before
    /// returning", so a crash between the concurrency check and this call
    /// never leaves a half-persisted run).
    async fn create_run_with_job_runs(
        &self,
        run: PipelineRun,
        job_runs: Vec<PipelineJobRun>,
    ) -> Result<(), CoreError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>, CoreError>;
    async fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError>;
    async fn mark_run_started(&self, id: &RunId) -> Result<(), CoreError>;
    async fn mark_run_finished(
        &self,
        id: &RunId,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError>;

    async fn list_job_runs(&self, run_id: &RunId) -> Result<Vec<PipelineJobRun>, CoreError>;
    async fn update_job_run_status(
        &self,
        id: &JobRunId,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError>;
    async fn mark_job_run_started(&self, id: &JobRunId) -> Result<(), CoreError>;

    /// Bulk-transition every job run for `run_id` still in PENDING to
    /// `status` — used by cancellation (§4.2: "atomically marks the Run
    /// CANCELLED ... and updates any still-PENDING job runs to CANCELLED")
    /// and by the execution loop's level-skip step.
    async fn transition_pending_job_runs(
        &self,
        run_id: &RunId,
        status: JobRunStatus,
    ) -> Result<(), CoreError>;

    /// Ordered SQL blocks of a job's notebook, fetched fresh per attempt.
    async fn notebook_sql_blocks(&self, job: &PipelineJob) -> Result<Vec<String>, CoreError>;
}
