//! Append-only audit records. Never mutated, never deleted by the core.

use lattice_ids::AuditId;
use serde::{Deserialize, Serialize};

/// What an audit entry records having happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Execute,
    CreateSession,
    CloseSession,
}

/// Outcome recorded alongside an [`AuditAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Allowed,
    Denied,
}

/// `(principal_name, action, status, original_sql?, rewritten_sql?,
/// tables_accessed?, duration_ms?, created_at)`, plus the denial reason a
/// DENIED entry is required to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub principal_name: String,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub original_sql: Option<String>,
    pub rewritten_sql: Option<String>,
    pub tables_accessed: Option<Vec<String>>,
    pub duration_ms: Option<u64>,
    pub reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AuditEntry {
    pub fn new(principal_name: impl Into<String>, action: AuditAction, status: AuditStatus) -> Self {
        Self {
            id: AuditId::new(),
            principal_name: principal_name.into(),
            action,
            status,
            original_sql: None,
            rewritten_sql: None,
            tables_accessed: None,
            duration_ms: None,
            reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn allowed_execute(
        principal_name: impl Into<String>,
        original_sql: impl Into<String>,
        rewritten_sql: impl Into<String>,
        tables_accessed: Vec<String>,
    ) -> Self {
        let mut entry = Self::new(principal_name, AuditAction::Execute, AuditStatus::Allowed);
        entry.original_sql = Some(original_sql.into());
        entry.rewritten_sql = Some(rewritten_sql.into());
        entry.tables_accessed = Some(tables_accessed);
        entry
    }

    pub fn denied_execute(
        principal_name: impl Into<String>,
        original_sql: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut entry = Self::new(principal_name, AuditAction::Execute, AuditStatus::Denied);
        entry.original_sql = Some(original_sql.into());
        entry.reason = Some(reason.into());
        entry
    }
}
