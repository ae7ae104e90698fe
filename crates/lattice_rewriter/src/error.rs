//! Failure classification for a rewrite attempt (§4.1). Every variant here
//! maps 1:1 onto a [`lattice_domain::CoreError`] variant at the boundary
//! where a caller-facing result is produced.

use lattice_domain::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    /// The input contains more than one statement. Detected before
    /// classification and before table extraction — no downstream step
    /// ever operates on multi-statement input.
    #[error("input contains more than one SQL statement")]
    MultiStatement,

    /// The SQL could not be parsed at all.
    #[error("could not parse SQL: {0}")]
    Unparseable(String),

    /// The principal lacks the minimum privilege for the statement's
    /// classification on a referenced securable.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A row filter or column mask bound to the principal failed
    /// validation (subquery, DDL token, multi-statement separator) or
    /// failed to parse. Never silently skipped — the whole rewrite fails.
    #[error("unsafe policy expression: {0}")]
    UnsafeExpression(String),

    /// A referenced table name could not be resolved to a known table id.
    #[error("unresolved table: {0}")]
    UnresolvedTable(String),

    /// Environment/bug, not a policy outcome.
    #[error("internal rewriter error: {0}")]
    Internal(String),
}

impl From<RewriteError> for CoreError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::MultiStatement => {
                CoreError::Validation("multi-statement SQL is not permitted".to_string())
            }
            RewriteError::Unparseable(msg) => CoreError::Unparseable(msg),
            RewriteError::AccessDenied(msg) => CoreError::AccessDenied(msg),
            RewriteError::UnsafeExpression(msg) => CoreError::UnsafeExpression(msg),
            RewriteError::UnresolvedTable(msg) => CoreError::NotFound(msg),
            RewriteError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}
