//! Notebook session manager (§4.3): the public contract for creating
//! sessions, running cells against a pinned connection, and reclaiming
//! idle sessions.

use crate::error::SessionError;
use crate::registry::SessionRegistry;
use crate::session::{CellResult, Session};
use lattice_db::EnginePool;
use lattice_domain::{
    AuditAction, AuditEntry, AuditStatus, CellType, CoreConfig, SessionJob, SessionJobState,
};
use lattice_ids::{NotebookId, SessionId, SessionJobId};
use lattice_repository::{AuditSink, NotebookRepository, SessionJobRepository};
use std::sync::Arc;
use tracing::info;

/// Result of `RunAll` (§3 supplemented feature): reports how far execution
/// got rather than a bare unit, since a notebook can fail partway through.
#[derive(Debug, Clone)]
pub struct RunAllResult {
    pub cells_executed: usize,
    pub failed_cell: Option<lattice_ids::CellId>,
    pub results: Vec<(lattice_ids::CellId, CellResult)>,
}

impl RunAllResult {
    fn succeeded(&self) -> bool {
        self.failed_cell.is_none()
    }
}

pub struct SessionManager {
    pool: Arc<EnginePool>,
    notebooks: Arc<dyn NotebookRepository>,
    session_jobs: Arc<dyn SessionJobRepository>,
    audit: Arc<dyn AuditSink>,
    registry: SessionRegistry,
    config: CoreConfig,
}

impl SessionManager {
    pub fn new(
        pool: Arc<EnginePool>,
        notebooks: Arc<dyn NotebookRepository>,
        session_jobs: Arc<dyn SessionJobRepository>,
        audit: Arc<dyn AuditSink>,
        config: CoreConfig,
    ) -> Self {
        Self {
            pool,
            notebooks,
            session_jobs,
            audit,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// `CreateSession(notebook_id, principal) -> Session`.
    pub async fn create_session(
        &self,
        notebook_id: NotebookId,
        principal: &str,
    ) -> Result<SessionId, SessionError> {
        self.notebooks
            .get_notebook(&notebook_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(notebook_id.to_string()))?;

        let pinned = self.pool.acquire_pinned().await?;
        let session = Arc::new(Session::new(
            SessionId::new(),
            notebook_id,
            principal.to_string(),
            pinned,
        ));
        let id = session.id.clone();
        self.registry.insert(session).await;

        self.audit
            .record(AuditEntry::new(principal, AuditAction::CreateSession, AuditStatus::Allowed))
            .await;
        info!(session_id = %id, principal, "session created");
        Ok(id)
    }

    /// `CloseSession(session_id, principal?) -> ()`.
    pub async fn close_session(
        &self,
        session_id: &SessionId,
        principal: Option<&str>,
    ) -> Result<(), SessionError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        check_principal(&session, principal)?;

        session.mark_closing();
        self.registry.remove(session_id).await;
        session.close().await;

        self.audit
            .record(AuditEntry::new(
                session.principal.clone(),
                AuditAction::CloseSession,
                AuditStatus::Allowed,
            ))
            .await;
        Ok(())
    }

    /// `ExecuteCell(session_id, cell_id, principal?) -> Result`.
    pub async fn execute_cell(
        &self,
        session_id: &SessionId,
        cell_id: &lattice_ids::CellId,
        principal: Option<&str>,
    ) -> Result<CellResult, SessionError> {
        let session = self.lookup_active(session_id, principal).await?;

        let cell = self
            .notebooks
            .get_cell(cell_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(cell_id.to_string()))?;
        if cell.cell_type != CellType::Sql {
            return Err(SessionError::Validation(
                "only SQL cells can be executed".to_string(),
            ));
        }

        let result = session.execute_sql(&cell.content).await?;
        session.touch();

        let result_json = serde_json::to_string(&result)
            .map_err(|err| SessionError::Validation(format!("failed to serialize result: {err}")))?;
        self.notebooks.store_cached_result(cell_id, result_json).await?;

        Ok(result)
    }

    /// `RunAll(session_id, principal?) -> RunAllResult`. Stops at the first
    /// cell whose result carries an error; checks the session's lifetime
    /// between cells. No per-cell audit is emitted (only the outer call).
    pub async fn run_all(
        &self,
        session_id: &SessionId,
        principal: Option<&str>,
    ) -> Result<RunAllResult, SessionError> {
        let session = self.lookup_active(session_id, principal).await?;
        let cells = self.notebooks.list_cells(&session.notebook_id).await?;

        let mut results = Vec::new();
        let mut failed_cell = None;

        for cell in cells {
            if session.lifetime().is_cancelled() {
                break;
            }
            if cell.cell_type != CellType::Sql {
                continue;
            }

            let result = session.execute_sql(&cell.content).await?;
            session.touch();
            if let Ok(result_json) = serde_json::to_string(&result) {
                self.notebooks.store_cached_result(&cell.id, result_json).await?;
            }

            let failed = result.is_error();
            results.push((cell.id.clone(), result));
            if failed {
                failed_cell = Some(cell.id);
                break;
            }
        }

        Ok(RunAllResult {
            cells_executed: results.len(),
            failed_cell,
            results,
        })
    }

    /// `RunAllAsync(session_id, principal?) -> SessionJob`. Spawns the run
    /// on the session's own lifetime, not the caller's: the job keeps
    /// running after the request that started it returns.
    pub async fn run_all_async(
        self: &Arc<Self>,
        session_id: &SessionId,
        principal: Option<&str>,
    ) -> Result<SessionJobId, SessionError> {
        let session = self.lookup_active(session_id, principal).await?;

        let job = SessionJob::pending(session.notebook_id.clone(), session.id.clone());
        let job_id = job.id.clone();
        self.session_jobs.create(job).await?;

        let manager = Arc::clone(self);
        let session_id = session_id.clone();
        let lifetime = session.lifetime().clone();
        tokio::spawn(async move {
            tokio::select! {
                result = manager.run_all(&session_id, None) => {
                    let _ = match result {
                        Ok(outcome) if outcome.succeeded() => {
                            let result_json = serde_json::to_string(&outcome.cells_executed).ok();
                            manager
                                .session_jobs
                                .update_state(&job_id, SessionJobState::Complete, result_json, None)
                                .await
                        }
                        Ok(outcome) => {
                            manager
                                .session_jobs
                                .update_state(
                                    &job_id,
                                    SessionJobState::Failed,
                                    None,
                                    Some(format!("failed at cell {:?}", outcome.failed_cell)),
                                )
                                .await
                        }
                        Err(err) => {
                            manager
                                .session_jobs
                                .update_state(&job_id, SessionJobState::Failed, None, Some(err.to_string()))
                                .await
                        }
                    };
                }
                _ = lifetime.cancelled() => {
                    let _ = manager
                        .session_jobs
                        .update_state(&job_id, SessionJobState::Failed, None, Some("session closed".to_string()))
                        .await;
                }
            }
        });

        Ok(job_id)
    }

    /// Reap sessions idle past the configured TTL. Returns the number
    /// reaped.
    pub async fn reap_idle(&self) -> usize {
        let drained = self.registry.drain_idle(self.config.session_ttl).await;
        let count = drained.len();
        for session in drained {
            session.close().await;
        }
        if count > 0 {
            info!(reaped = count, "idle notebook sessions reaped");
        }
        count
    }

    /// Close every open session unconditionally, e.g. on shutdown.
    pub async fn close_all(&self) {
        let drained = self.registry.drain_all().await;
        let count = drained.len();
        for session in drained {
            session.close().await;
        }
        if count > 0 {
            info!(closed = count, "all notebook sessions closed");
        }
    }

    async fn lookup_active(
        &self,
        session_id: &SessionId,
        principal: Option<&str>,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.is_closing() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        check_principal(&session, principal)?;
        Ok(session)
    }
}

fn check_principal(session: &Session, principal: Option<&str>) -> Result<(), SessionError> {
    if let Some(principal) = principal {
        if principal != session.principal {
            return Err(SessionError::AccessDenied(
                "principal does not match the session's owner".to_string(),
            ));
        }
    }
    Ok(())
}
