//! The per-request / per-operation context threaded through repository
//! calls and core operations: a principal (when authorization applies) and
//! a cancellation-bearing lifetime.
//!
//! Absence of a principal is an error for any operation that requires
//! authorization; callers construct an anonymous context only for
//! operations that don't check privileges (e.g. background reap ticks).

use crate::principal::Principal;
use tokio_util::sync::CancellationToken;

/// A cancellation-bearing scope. Cloning shares the same underlying token —
/// cancelling one clone cancels every operation awaiting it.
#[derive(Clone)]
pub struct OperationContext {
    principal: Option<Principal>,
    cancellation: CancellationToken,
}

impl OperationContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            cancellation: CancellationToken::new(),
        }
    }

    /// A context with no authenticated principal, for background
    /// operations that do not check privileges.
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A child context sharing this context's principal but cancellable
    /// independently (e.g. scoping a background job's lifetime separately
    /// from the triggering request's).
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }
}
