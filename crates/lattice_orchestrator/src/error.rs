//! Failure classification for DAG resolution, triggering, and cancellation
//! (§4.2). Every variant converts 1:1 into a [`lattice_domain::CoreError`].

use lattice_domain::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("pipeline not found: {0}")]
    NotFound(String),

    #[error("pipeline {pipeline} has {active} active run(s), at its concurrency limit of {limit}")]
    ConcurrencyExhausted {
        pipeline: String,
        active: u32,
        limit: u32,
    },

    #[error("pipeline has no jobs")]
    EmptyPipeline,

    #[error("job dependency graph contains a cycle")]
    CycleDetected,

    #[error("job {job} depends on unknown job {dependency}")]
    UnknownDependency { job: String, dependency: String },

    #[error("job depends on itself: {0}")]
    SelfDependency(String),

    #[error("parameter key is not a valid identifier: {0}")]
    InvalidParameter(String),

    #[error("operation invalid for the run's current state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Engine(#[from] lattice_db::EngineError),

    #[error("repository error: {0}")]
    Repository(#[from] CoreError),
}

impl From<OrchestratorError> for CoreError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NotFound(msg) => CoreError::NotFound(msg),
            OrchestratorError::ConcurrencyExhausted { pipeline, active, limit } => {
                CoreError::ConcurrencyExhausted(format!(
                    "pipeline {pipeline} has {active} active run(s), limit {limit}"
                ))
            }
            OrchestratorError::EmptyPipeline => {
                CoreError::Validation("pipeline has no jobs".to_string())
            }
            OrchestratorError::CycleDetected => {
                CoreError::Validation("job dependency graph contains a cycle".to_string())
            }
            OrchestratorError::UnknownDependency { job, dependency } => CoreError::Validation(
                format!("job {job} depends on unknown job {dependency}"),
            ),
            OrchestratorError::SelfDependency(job) => {
                CoreError::Validation(format!("job depends on itself: {job}"))
            }
            OrchestratorError::InvalidParameter(msg) => CoreError::Validation(msg),
            OrchestratorError::InvalidState(msg) => CoreError::InvalidState(msg),
            OrchestratorError::Engine(err) => CoreError::Internal(err.to_string()),
            OrchestratorError::Repository(err) => err,
        }
    }
}
