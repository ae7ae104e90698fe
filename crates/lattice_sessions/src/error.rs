//! Failure classification for the session manager (§4.3). Every variant
//! converts 1:1 into a [`lattice_domain::CoreError`].

use lattice_domain::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation invalid for the session's current state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Engine(#[from] lattice_db::EngineError),

    #[error("repository error: {0}")]
    Repository(#[from] CoreError),
}

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(msg) => CoreError::NotFound(msg),
            SessionError::AccessDenied(msg) => CoreError::AccessDenied(msg),
            SessionError::Validation(msg) => CoreError::Validation(msg),
            SessionError::InvalidState(msg) => CoreError::InvalidState(msg),
            SessionError::Engine(err) => CoreError::Internal(err.to_string()),
            SessionError::Repository(err) => err,
        }
    }
}
