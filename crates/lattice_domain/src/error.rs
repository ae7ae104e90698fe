//! Shared error taxonomy for the control plane core.
//!
//! Every subsystem (rewriter, orchestrator, session manager) and the
//! repository contracts they consume return this enum so that callers at the
//! HTTP boundary can map a single taxonomy to stable status codes, rather
//! than each subsystem inventing its own.

use thiserror::Error;

/// Errors common to all three core subsystems.
///
/// Variant choice follows the propagation policy: repository errors are
/// wrapped to preserve their kind ("no such row" stays `NotFound`, never
/// becomes `Internal`), and nothing here is retried internally.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity missing (maps to HTTP 404 at the boundary).
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation, e.g. duplicate catalog or run name (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input does not satisfy an invariant (HTTP 400): bad cron, self
    /// dependency, invalid parameter name, non-SQL cell for execute, empty
    /// pipeline, multi-statement SQL classified outside the rewriter's own
    /// `MultiStatement` path.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Authorization failed; surfaced verbatim from the authorization step
    /// to the caller (HTTP 403).
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// SQL failed to parse (HTTP 400).
    #[error("unparseable SQL: {0}")]
    Unparseable(String),

    /// A row filter or column mask failed validation: subquery, DDL token,
    /// multi-statement separator, or parse failure (HTTP 400).
    #[error("unsafe expression: {0}")]
    UnsafeExpression(String),

    /// Operation invalid for the current state, e.g. cancelling a run that
    /// already reached a terminal status (HTTP 409).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A pipeline's active-run cap was hit (HTTP 429).
    #[error("concurrency exhausted: {0}")]
    ConcurrencyExhausted(String),

    /// Everything else: a bug or environment failure (HTTP 500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable HTTP status this error kind maps to at the boundary. The
    /// boundary layer itself is out of scope for the core, but the mapping
    /// is specified here to anchor the error design.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::NotFound(_) => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Validation(_) => 400,
            CoreError::AccessDenied(_) => 403,
            CoreError::Unparseable(_) => 400,
            CoreError::UnsafeExpression(_) => 400,
            CoreError::InvalidState(_) => 409,
            CoreError::ConcurrencyExhausted(_) => 429,
            CoreError::Internal(_) => 500,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        CoreError::AccessDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(CoreError::NotFound("x".into()).http_status(), 404);
        assert_eq!(CoreError::ConcurrencyExhausted("x".into()).http_status(), 429);
        assert_eq!(CoreError::Internal("x".into()).http_status(), 500);
    }
}
