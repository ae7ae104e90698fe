//! Runtime session state (§4.3, §5): a pinned connection plus the
//! per-session mutex, lifetime, and idle bookkeeping that the manager and
//! registry operate on. Distinct from [`lattice_domain::SessionJob`], which
//! is the plain persisted record of one `RunAllAsync` invocation.

use chrono::{DateTime, Utc};
use lattice_db::{DbValue, EngineError, PinnedConnection};
use lattice_ids::{NotebookId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// Captured result of executing one SQL cell: either columns+rows, or an
/// error message. SQL errors are carried here, never raised (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub error: Option<String>,
}

impl CellResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }
}

fn db_value_to_json(value: &DbValue) -> JsonValue {
    match value {
        DbValue::Null => JsonValue::Null,
        DbValue::Integer(v) => JsonValue::from(*v),
        DbValue::Real(v) => serde_json::Number::from_f64(*v).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        DbValue::Text(v) => JsonValue::String(v.clone()),
        DbValue::Blob(v) => JsonValue::String(hex_encode(v)),
        DbValue::Boolean(v) => JsonValue::Bool(*v),
        DbValue::Timestamp(v) => JsonValue::String(v.to_rfc3339()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct Session {
    pub id: SessionId,
    pub notebook_id: NotebookId,
    pub principal: String,
    conn: AsyncMutex<Option<PinnedConnection>>,
    lifetime: CancellationToken,
    closing: AtomicBool,
    last_used_at: StdMutex<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionId, notebook_id: NotebookId, principal: String, conn: PinnedConnection) -> Self {
        Self {
            id,
            notebook_id,
            principal,
            conn: AsyncMutex::new(Some(conn)),
            lifetime: CancellationToken::new(),
            closing: AtomicBool::new(false),
            last_used_at: StdMutex::new(Utc::now()),
        }
    }

    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn touch(&self) {
        *self.last_used_at.lock().unwrap() = Utc::now();
    }

    /// Whether this session has been idle for at least `ttl`, as of `now`.
    pub fn is_idle(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        let idle = now.signed_duration_since(*self.last_used_at.lock().unwrap());
        idle >= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
    }

    /// Cancel the lifetime and release the pinned connection back to the
    /// pool. Idempotent: a session whose connection was already released
    /// does nothing on a second call.
    pub async fn close(&self) {
        self.lifetime.cancel();
        let mut guard = self.conn.lock().await;
        if let Some(pinned) = guard.take() {
            pinned.release();
        }
    }

    /// Execute `sql` as a query on the pinned connection, serialized by
    /// the mutex guarding it (§5: "only the mutex holder may issue engine
    /// calls on it"). SQL failures are captured in the result, not
    /// propagated.
    pub async fn execute_sql(&self, sql: &str) -> Result<CellResult, EngineError> {
        let guard = self.conn.lock().await;
        let Some(pinned) = guard.as_ref() else {
            return Ok(CellResult::failure("session connection is closed"));
        };

        match pinned.query_all(sql, Vec::<DbValue>::new()).await {
            Ok(rows) => {
                let columns = rows.first().map(|r| r.column_names().to_vec()).unwrap_or_default();
                let json_rows = rows
                    .iter()
                    .map(|row| {
                        (0..row.len())
                            .map(|idx| row.get_raw(idx).map(db_value_to_json).unwrap_or(JsonValue::Null))
                            .collect()
                    })
                    .collect();
                Ok(CellResult {
                    columns,
                    rows: json_rows,
                    error: None,
                })
            }
            Err(err) => Ok(CellResult::failure(err.to_string())),
        }
    }
}
