//! Pipelines, jobs, and the runs/job-runs that record their execution.

use crate::error::CoreError;
use lattice_ids::{JobRunId, NotebookId, PipelineId, PipelineJobId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `(id, name, schedule_cron?, is_paused, concurrency_limit>=1, created_by)`.
/// Owns an ordered set of [`PipelineJob`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub schedule_cron: Option<String>,
    pub is_paused: bool,
    pub concurrency_limit: u32,
    pub created_by: String,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>, concurrency_limit: u32) -> Self {
        Self {
            id: PipelineId::new(),
            name: name.into(),
            schedule_cron: None,
            is_paused: false,
            concurrency_limit: concurrency_limit.max(1),
            created_by: created_by.into(),
        }
    }
}

/// `(id, pipeline_id, name, notebook_id, depends_on, retry_count>=0,
/// timeout_seconds>=0, job_order)`.
///
/// Invariants (enforced by the orchestrator's DAG resolution, not by this
/// type): job names unique within pipeline; every `depends_on` entry names
/// another job in the same pipeline; the dependency graph is acyclic; a job
/// does not depend on itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: PipelineJobId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub notebook_id: NotebookId,
    pub depends_on: BTreeSet<String>,
    pub retry_count: u32,
    pub timeout_seconds: u64,
    pub job_order: u32,
}

impl PipelineJob {
    pub fn new(pipeline_id: PipelineId, name: impl Into<String>, notebook_id: NotebookId, job_order: u32) -> Self {
        Self {
            id: PipelineJobId::new(),
            pipeline_id,
            name: name.into(),
            notebook_id,
            depends_on: BTreeSet::new(),
            retry_count: 0,
            timeout_seconds: 0,
            job_order,
        }
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// How a [`PipelineRun`] was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Api,
}

/// Status of a [`PipelineRun`]. Terminal states (`Success`, `Failed`,
/// `Cancelled`) are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// A run "is active" iff status ∈ {PENDING, RUNNING}.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Status of a [`PipelineJobRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl JobRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobRunStatus::Success
                | JobRunStatus::Failed
                | JobRunStatus::Skipped
                | JobRunStatus::Cancelled
        )
    }
}

/// `(id, pipeline_id, status, trigger_type, triggered_by, parameters,
/// started_at?, finished_at?, error_message?)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub triggered_by: String,
    pub parameters: BTreeMap<String, String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
}

impl PipelineRun {
    pub fn new(
        pipeline_id: PipelineId,
        trigger_type: TriggerType,
        triggered_by: impl Into<String>,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: RunId::new(),
            pipeline_id,
            status: RunStatus::Pending,
            trigger_type,
            triggered_by: triggered_by.into(),
            parameters,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }
}

/// `(id, run_id, job_id, job_name, status, started_at?, finished_at?,
/// error_message?)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJobRun {
    pub id: JobRunId,
    pub run_id: RunId,
    pub job_id: PipelineJobId,
    pub job_name: String,
    pub status: JobRunStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
}

impl PipelineJobRun {
    pub fn pending(run_id: RunId, job_id: PipelineJobId, job_name: impl Into<String>) -> Self {
        Self {
            id: JobRunId::new(),
            run_id,
            job_id,
            job_name: job_name.into(),
            status: JobRunStatus::Pending,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }
}

/// Validate a job set at construction time, before DAG resolution ever
/// runs: job names unique within the pipeline, no job naming itself, and
/// every `depends_on` entry naming another job actually present (§3's
/// invariants). Cycle detection is `resolve_execution_order`'s job, not
/// this check's — a cycle can exist even when every individual edge here
/// is well-formed.
pub fn validate_job_set(jobs: &[PipelineJob]) -> Result<(), CoreError> {
    let mut seen = BTreeSet::new();
    for job in jobs {
        if !seen.insert(job.name.as_str()) {
            return Err(CoreError::Conflict(format!(
                "duplicate job name in pipeline: {}",
                job.name
            )));
        }
    }
    for job in jobs {
        if job.depends_on.contains(&job.name) {
            return Err(CoreError::Validation(format!(
                "job depends on itself: {}",
                job.name
            )));
        }
        for dep in &job.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(CoreError::Validation(format!(
                    "job {} depends on unknown job {}",
                    job.name, dep
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ids::NotebookId;

    fn job(pipeline: PipelineId, name: &str, order: u32) -> PipelineJob {
        PipelineJob::new(pipeline, name, NotebookId::new(), order)
    }

    #[test]
    fn rejects_duplicate_job_names() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(pipeline.clone(), "extract", 0), job(pipeline, "extract", 1)];
        let err = validate_job_set(&jobs).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn rejects_self_dependency() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(pipeline, "extract", 0).depends_on(["extract"])];
        let err = validate_job_set(&jobs).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(pipeline, "load", 0).depends_on(["extract"])];
        let err = validate_job_set(&jobs).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn accepts_well_formed_diamond() {
        let pipeline = PipelineId::new();
        let jobs = vec![
            job(pipeline.clone(), "extract", 0),
            job(pipeline.clone(), "transform_a", 1).depends_on(["extract"]),
            job(pipeline.clone(), "transform_b", 2).depends_on(["extract"]),
            job(pipeline, "load", 3).depends_on(["transform_a", "transform_b"]),
        ];
        assert!(validate_job_set(&jobs).is_ok());
    }
}
