//! Run-cancel map (§5, §9): a concurrent map keyed by run id storing each
//! run's cancellation handle. Added on trigger, removed on completion
//! (deferred, by the executor) or on explicit cancel (load-and-remove, by
//! [`RunCancelRegistry::cancel`]).
//!
//! No `dashmap` dependency exists in the teacher's stack, so a
//! `tokio::sync::RwLock<HashMap<..>>` stands in for the "concurrent map" §5
//! asks for, matching the teacher's preference for `tokio::sync` primitives
//! in async contexts.

use lattice_ids::RunId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RunCancelRegistry {
    tokens: RwLock<HashMap<RunId, CancellationToken>>,
}

impl RunCancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `run_id`, returning it for the executor
    /// to hold onto as the run's lifetime.
    pub async fn register(&self, run_id: RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.write().await.insert(run_id, token.clone());
        token
    }

    /// Load-and-remove: cancel `run_id`'s token if present, returning
    /// whether a token was found (i.e. the run was known to be active).
    pub async fn cancel(&self, run_id: &RunId) -> bool {
        match self.tokens.write().await.remove(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Deferred removal on normal completion — the token itself is not
    /// cancelled, just forgotten, since the run reached a terminal state on
    /// its own.
    pub async fn remove(&self, run_id: &RunId) {
        self.tokens.write().await.remove(run_id);
    }

    pub async fn contains(&self, run_id: &RunId) -> bool {
        self.tokens.read().await.contains_key(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_load_and_remove() {
        let registry = RunCancelRegistry::new();
        let run_id = RunId::new();
        let token = registry.register(run_id.clone()).await;
        assert!(registry.cancel(&run_id).await);
        assert!(token.is_cancelled());
        assert!(!registry.contains(&run_id).await);
        assert!(
            !registry.cancel(&run_id).await,
            "second cancel finds nothing to remove"
        );
    }

    #[tokio::test]
    async fn remove_does_not_cancel() {
        let registry = RunCancelRegistry::new();
        let run_id = RunId::new();
        let token = registry.register(run_id.clone()).await;
        registry.remove(&run_id).await;
        assert!(!token.is_cancelled());
        assert!(!registry.contains(&run_id).await);
    }
}
