//! Plain data shared by the Session Manager's runtime state.
//!
//! The runtime `Session` itself (pinned connection, lifetime, mutex) lives
//! in `lattice_sessions`, which depends on the engine; this crate stays
//! engine-agnostic and only describes the session-scoped job record the
//! spec calls out as part of the data model.

use lattice_ids::{NotebookId, SessionId, SessionJobId};
use serde::{Deserialize, Serialize};

/// State of a [`SessionJob`]; mirrors [`crate::pipeline::JobRunStatus`] at
/// session scope (no `Skipped` — a run-all either executes a cell or stops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionJobState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl SessionJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionJobState::Complete | SessionJobState::Failed)
    }
}

/// `(id, notebook_id, session_id, state, result?, error?)`. Tracks an
/// asynchronous `RunAllAsync` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionJob {
    pub id: SessionJobId,
    pub notebook_id: NotebookId,
    pub session_id: SessionId,
    pub state: SessionJobState,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl SessionJob {
    pub fn pending(notebook_id: NotebookId, session_id: SessionId) -> Self {
        Self {
            id: SessionJobId::new(),
            notebook_id,
            session_id,
            state: SessionJobState::Pending,
            result: None,
            error: None,
        }
    }
}
