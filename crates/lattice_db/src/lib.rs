//! Embedded query-engine layer for the Lattice control plane.
//!
//! Provides DuckDB connection handling (columnar, OLAP-optimized,
//! single-writer enforced via file lock) and an async handle on top of it
//! for pipeline jobs and notebook sessions.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_db::{DbConnection, EnginePool};
//!
//! let conn = DbConnection::open_duckdb(Path::new("./data.duckdb"))?;
//! let pool = EnginePool::new(conn, 8);
//! let handle = pool.acquire().await?;
//! handle.execute("INSERT INTO t (id) VALUES (?)", vec![1.into()]).await?;
//! let rows = handle.query_all("SELECT * FROM t", vec![]).await?;
//! ```

pub mod backend;
pub mod engine;
pub mod lock;

pub use backend::{
    AccessMode, BackendError, DbConnection, DbRow as UnifiedDbRow, DbTimestamp, DbTimestampError,
    DbTransaction, DbValue, FromDbValue,
};
pub use engine::{EngineError, EngineHandle, EnginePool, PinnedConnection, PooledConnection};
#[cfg(feature = "duckdb")]
pub use lock::{is_locked, lock_exclusive, try_lock_exclusive, try_lock_shared};
pub use lock::{lock_path_for, DbLockGuard, LockError};
