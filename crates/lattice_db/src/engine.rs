//! Async query-engine handle.
//!
//! The rest of the crate (`backend`) is synchronous: DuckDB connections are
//! not safe to drive from async code directly. This module bridges blocking
//! calls onto a `spawn_blocking` thread and exposes two ways to get at the
//! engine:
//!
//! - [`EnginePool::acquire`] hands out a [`PooledConnection`] scoped to the
//!   caller; many callers can hold one concurrently, up to the pool's
//!   capacity.
//! - [`EnginePool::acquire_pinned`] hands out a [`PinnedConnection`] that
//!   holds the entire pool capacity until released, so only its holder may
//!   issue engine calls for as long as it's held. Notebook sessions pin a
//!   connection for their lifetime; everything else borrows from the pool
//!   per call.
//!
//! Both handle types deref to [`EngineHandle`], which does the actual
//! `spawn_blocking` dispatch.

use crate::backend::{BackendError, DbConnection, DbRow, DbValue};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors from the async engine layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("engine task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("engine pool is closed")]
    PoolClosed,
}

/// A cloneable handle to the embedded query engine.
///
/// Cheap to clone: it's a handle around the same `Arc<Mutex<duckdb::Connection>>`
/// that `DbConnection` already wraps. Cloning does not create a new
/// connection.
#[derive(Clone)]
pub struct EngineHandle {
    conn: DbConnection,
}

impl EngineHandle {
    pub fn new(conn: DbConnection) -> Self {
        Self { conn }
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: Vec<DbValue>) -> Result<u64, EngineError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let rows = tokio::task::spawn_blocking(move || conn.execute(&sql, &params)).await??;
        Ok(rows)
    }

    /// Execute a batch of statements with no parameter binding.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), EngineError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || conn.execute_batch(&sql)).await??;
        Ok(())
    }

    /// Run a query and collect every row.
    pub async fn query_all(&self, sql: &str, params: Vec<DbValue>) -> Result<Vec<DbRow>, EngineError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let rows = tokio::task::spawn_blocking(move || conn.query_all(&sql, &params)).await??;
        Ok(rows)
    }

    /// Run a query expected to return at most one row.
    pub async fn query_optional(
        &self,
        sql: &str,
        params: Vec<DbValue>,
    ) -> Result<Option<DbRow>, EngineError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let row = tokio::task::spawn_blocking(move || conn.query_optional(&sql, &params)).await??;
        Ok(row)
    }

    /// Run a query expected to return exactly one row.
    pub async fn query_one(&self, sql: &str, params: Vec<DbValue>) -> Result<DbRow, EngineError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let row = tokio::task::spawn_blocking(move || conn.query_one(&sql, &params)).await??;
        Ok(row)
    }

    /// Access the underlying synchronous connection, e.g. to run a
    /// multi-statement transaction inside a single `spawn_blocking` closure.
    pub fn sync_connection(&self) -> &DbConnection {
        &self.conn
    }
}

/// Bounded async access to a single embedded DuckDB connection.
///
/// DuckDB enforces a single writer; this pool does not multiply connections,
/// it multiplexes scoped access to the one `DbConnection` behind a semaphore
/// so callers queue instead of racing.
pub struct EnginePool {
    conn: DbConnection,
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

impl EnginePool {
    pub fn new(conn: DbConnection, capacity: usize) -> Self {
        let capacity = capacity.max(1) as u32;
        Self {
            conn,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Acquire a pooled handle scoped to the caller. Released automatically
    /// when the returned guard is dropped.
    pub async fn acquire(&self) -> Result<PooledConnection, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        Ok(PooledConnection {
            handle: EngineHandle::new(self.conn.clone()),
            _permit: permit,
        })
    }

    /// Acquire exclusive use of the engine, owned until the returned
    /// [`PinnedConnection`] is released or dropped. Used to pin a connection
    /// to a notebook session for its lifetime.
    pub async fn acquire_pinned(&self) -> Result<PinnedConnection, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_many_owned(self.capacity)
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        Ok(PinnedConnection {
            handle: EngineHandle::new(self.conn.clone()),
            _permit: permit,
        })
    }
}

/// A handle borrowed from the pool for the duration of one call or one
/// request's worth of calls.
pub struct PooledConnection {
    handle: EngineHandle,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = EngineHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

/// A handle that owns exclusive engine access until released.
pub struct PinnedConnection {
    handle: EngineHandle,
    _permit: OwnedSemaphorePermit,
}

impl PinnedConnection {
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Release exclusive access back to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl std::ops::Deref for PinnedConnection {
    type Target = EngineHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DbConnection;

    fn memory_pool(capacity: usize) -> EnginePool {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        EnginePool::new(conn, capacity)
    }

    #[tokio::test]
    async fn pooled_handle_executes_and_queries() {
        let pool = memory_pool(4);
        let handle = pool.acquire().await.unwrap();
        handle
            .execute_batch("CREATE TABLE t (id BIGINT)")
            .await
            .unwrap();
        handle
            .execute("INSERT INTO t (id) VALUES (?)", vec![DbValue::from(1_i64)])
            .await
            .unwrap();
        let rows = handle.query_all("SELECT id FROM t", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn pinned_connection_blocks_other_pooled_acquires_until_released() {
        let pool = memory_pool(2);
        let pinned = pool.acquire_pinned().await.unwrap();

        let pool_ref = &pool;
        let acquired_while_pinned = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            pool_ref.acquire(),
        )
        .await;
        assert!(acquired_while_pinned.is_err());

        pinned.release();
        let acquired_after_release = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            pool_ref.acquire(),
        )
        .await;
        assert!(acquired_after_release.is_ok());
    }
}
