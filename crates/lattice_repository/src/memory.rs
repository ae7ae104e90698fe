//! In-process fakes for every repository trait, used by subsystem tests in
//! `lattice_rewriter`, `lattice_orchestrator`, and `lattice_sessions`. No
//! real store is specified for this layer (§4.4); these fakes stand in for
//! one the way the teacher's `casparian_test_utils` fakes stand in for its
//! own storage traits.

use crate::{
    AuditSink, CatalogRepository, GrantRepository, NotebookRepository, PipelineRepository,
    PolicyRepository, ResolvedTable, SessionJobRepository,
};
use crate::policy::EffectiveColumnMask;
use async_trait::async_trait;
use lattice_domain::{
    AuditEntry, Cell, ColumnMask, ColumnMaskBinding, CoreError, JobRunStatus, Notebook, Pipeline,
    PipelineJob, PipelineJobRun, PipelineRun, Privilege, RowFilter, RunStatus, SessionJob,
    SessionJobState,
};
use lattice_ids::{CellId, JobRunId, NotebookId, PipelineId, RunId, SecurableId, SessionJobId};
use std::collections::HashMap;
use std::sync::RwLock;

/// An in-memory grant table: `(principal_name, securable_id) -> set of
/// privileges`, plus an admin set. Group expansion is pre-flattened by the
/// test setting up the fake (no group indirection is modeled here).
#[derive(Default)]
pub struct MemoryGrantRepository {
    grants: RwLock<HashMap<(String, SecurableId), Vec<Privilege>>>,
    admins: RwLock<Vec<String>>,
}

impl MemoryGrantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, principal_name: impl Into<String>, securable: SecurableId, privilege: Privilege) {
        self.grants
            .write()
            .unwrap()
            .entry((principal_name.into(), securable))
            .or_default()
            .push(privilege);
    }

    pub fn make_admin(&self, principal_name: impl Into<String>) {
        self.admins.write().unwrap().push(principal_name.into());
    }
}

#[async_trait]
impl GrantRepository for MemoryGrantRepository {
    async fn has_privilege(
        &self,
        principal_name: &str,
        securable: &SecurableId,
        privilege: Privilege,
    ) -> Result<bool, CoreError> {
        let grants = self.grants.read().unwrap();
        Ok(grants
            .get(&(principal_name.to_string(), securable.clone()))
            .is_some_and(|privs| privs.contains(&privilege)))
    }

    async fn is_admin(&self, principal_name: &str) -> Result<bool, CoreError> {
        Ok(self.admins.read().unwrap().iter().any(|p| p == principal_name))
    }
}

/// An in-memory policy store: per-table row filters and column masks,
/// with bindings keyed by principal name.
#[derive(Default)]
pub struct MemoryPolicyRepository {
    row_filters: RwLock<HashMap<SecurableId, Vec<(RowFilter, Vec<String>)>>>,
    column_masks: RwLock<HashMap<SecurableId, Vec<(ColumnMask, Vec<ColumnMaskBinding>)>>>,
}

impl MemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `filter` to every principal name in `principals`.
    pub fn add_row_filter(&self, filter: RowFilter, principals: Vec<String>) {
        self.row_filters
            .write()
            .unwrap()
            .entry(filter.table_id.clone())
            .or_default()
            .push((filter, principals));
    }

    pub fn add_column_mask(&self, mask: ColumnMask, bindings: Vec<ColumnMaskBinding>) {
        self.column_masks
            .write()
            .unwrap()
            .entry(mask.table_id.clone())
            .or_default()
            .push((mask, bindings));
    }
}

#[async_trait]
impl PolicyRepository for MemoryPolicyRepository {
    async fn effective_row_filters(
        &self,
        principal_name: &str,
        table_id: &SecurableId,
    ) -> Result<Vec<RowFilter>, CoreError> {
        let filters = self.row_filters.read().unwrap();
        Ok(filters
            .get(table_id)
            .into_iter()
            .flatten()
            .filter(|(_, principals)| principals.iter().any(|p| p == principal_name))
            .map(|(filter, _)| filter.clone())
            .collect())
    }

    async fn effective_column_masks(
        &self,
        principal_name: &str,
        table_id: &SecurableId,
    ) -> Result<Vec<EffectiveColumnMask>, CoreError> {
        let masks = self.column_masks.read().unwrap();
        Ok(masks
            .get(table_id)
            .into_iter()
            .flatten()
            .filter_map(|(mask, bindings)| {
                let applicable: Vec<ColumnMaskBinding> = bindings
                    .iter()
                    .filter(|b| b.principal_ref.0 == principal_name)
                    .cloned()
                    .collect();
                if applicable.is_empty() {
                    None
                } else {
                    Some(EffectiveColumnMask {
                        mask: mask.clone(),
                        bindings: applicable,
                    })
                }
            })
            .collect())
    }
}

/// An in-memory catalog: table names (qualified or not) map to a resolved
/// table with a fixed column list.
#[derive(Default)]
pub struct MemoryCatalogRepository {
    tables: RwLock<HashMap<String, ResolvedTable>>,
}

impl MemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under both its bare name and
    /// `{default_schema}.{name}` so lookups resolve whether the query
    /// qualifies it or not.
    pub fn add_table(&self, default_schema: &str, name: &str, column_names: Vec<&str>) -> SecurableId {
        let table_id = SecurableId::new();
        let resolved = ResolvedTable {
            table_id: table_id.clone(),
            schema_id: SecurableId::new(),
            qualified_name: format!("{default_schema}.{name}"),
            column_names: column_names.into_iter().map(str::to_string).collect(),
        };
        let mut tables = self.tables.write().unwrap();
        tables.insert(name.to_string(), resolved.clone());
        tables.insert(format!("{default_schema}.{name}"), resolved);
        table_id
    }
}

#[async_trait]
impl CatalogRepository for MemoryCatalogRepository {
    async fn resolve_table(
        &self,
        name: &str,
        _default_schema: &str,
    ) -> Result<Option<ResolvedTable>, CoreError> {
        Ok(self.tables.read().unwrap().get(name).cloned())
    }
}

/// An in-memory audit sink: records every entry it's handed. `record`
/// never fails by construction (§4.4), so there's nothing to swallow here,
/// but a real sink would log-and-drop on a store error in this spot.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) {
        self.entries.write().unwrap().push(entry);
    }
}

/// An in-memory pipeline/run/job-run store.
#[derive(Default)]
pub struct MemoryPipelineRepository {
    pipelines: RwLock<HashMap<PipelineId, Pipeline>>,
    jobs: RwLock<HashMap<PipelineId, Vec<PipelineJob>>>,
    runs: RwLock<HashMap<RunId, PipelineRun>>,
    job_runs: RwLock<HashMap<RunId, Vec<PipelineJobRun>>>,
    notebook_blocks: RwLock<HashMap<NotebookId, Vec<String>>>,
}

impl MemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pipeline(&self, pipeline: Pipeline, jobs: Vec<PipelineJob>) {
        let id = pipeline.id.clone();
        self.pipelines.write().unwrap().insert(id.clone(), pipeline);
        self.jobs.write().unwrap().insert(id, jobs);
    }

    pub fn set_notebook_blocks(&self, notebook_id: NotebookId, blocks: Vec<String>) {
        self.notebook_blocks.write().unwrap().insert(notebook_id, blocks);
    }

    pub fn run(&self, id: &RunId) -> PipelineRun {
        self.runs.read().unwrap().get(id).cloned().unwrap()
    }

    pub fn job_runs(&self, run_id: &RunId) -> Vec<PipelineJobRun> {
        self.job_runs.read().unwrap().get(run_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PipelineRepository for MemoryPipelineRepository {
    async fn get_pipeline_by_name(&self, name: &str) -> Result<Option<Pipeline>, CoreError> {
        Ok(self.pipelines.read().unwrap().values().find(|p| p.name == name).cloned())
    }

    async fn get_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, CoreError> {
        Ok(self.pipelines.read().unwrap().get(id).cloned())
    }

    async fn list_jobs(&self, pipeline_id: &PipelineId) -> Result<Vec<PipelineJob>, CoreError> {
        Ok(self.jobs.read().unwrap().get(pipeline_id).cloned().unwrap_or_default())
    }

    async fn list_scheduled(&self) -> Result<Vec<Pipeline>, CoreError> {
        Ok(self
            .pipelines
            .read()
            .unwrap()
            .values()
            .filter(|p| p.schedule_cron.is_some() && !p.is_paused)
            .cloned()
            .collect())
    }

    async fn count_active_runs(&self, pipeline_id: &PipelineId) -> Result<u32, CoreError> {
        Ok(self
            .runs
            .read()
            .unwrap()
            .values()
            .filter(|r| &r.pipeline_id == pipeline_id && r.status.is_active())
            .count() as u32)
    }

    async fn create_run_with_job_runs(
        &self,
        run: PipelineRun,
        job_runs: Vec<PipelineJobRun>,
    ) -> Result<(), CoreError> {
        let run_id = run.id.clone();
        self.runs.write().unwrap().insert(run_id.clone(), run);
        self.job_runs.write().unwrap().insert(run_id, job_runs);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<PipelineRun>, CoreError> {
        Ok(self.runs.read().unwrap().get(id).cloned())
    }

    async fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("run {id}")))?;
        run.status = status;
        if error_message.is_some() {
            run.error_message = error_message;
        }
        Ok(())
    }

    async fn mark_run_started(&self, id: &RunId) -> Result<(), CoreError> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("run {id}")))?;
        run.status = RunStatus::Running;
        run.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn mark_run_finished(
        &self,
        id: &RunId,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError> {
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("run {id}")))?;
        run.status = status;
        run.finished_at = Some(chrono::Utc::now());
        if error_message.is_some() {
            run.error_message = error_message;
        }
        Ok(())
    }

    async fn list_job_runs(&self, run_id: &RunId) -> Result<Vec<PipelineJobRun>, CoreError> {
        Ok(self.job_runs.read().unwrap().get(run_id).cloned().unwrap_or_default())
    }

    async fn update_job_run_status(
        &self,
        id: &JobRunId,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError> {
        let mut job_runs = self.job_runs.write().unwrap();
        for runs in job_runs.values_mut() {
            if let Some(jr) = runs.iter_mut().find(|jr| &jr.id == id) {
                jr.status = status;
                if status.is_terminal() {
                    jr.finished_at = Some(chrono::Utc::now());
                }
                if error_message.is_some() {
                    jr.error_message = error_message;
                }
                return Ok(());
            }
        }
        Err(CoreError::not_found(format!("job run {id}")))
    }

    async fn mark_job_run_started(&self, id: &JobRunId) -> Result<(), CoreError> {
        let mut job_runs = self.job_runs.write().unwrap();
        for runs in job_runs.values_mut() {
            if let Some(jr) = runs.iter_mut().find(|jr| &jr.id == id) {
                jr.status = JobRunStatus::Running;
                jr.started_at = Some(chrono::Utc::now());
                return Ok(());
            }
        }
        Err(CoreError::not_found(format!("job run {id}")))
    }

    async fn transition_pending_job_runs(
        &self,
        run_id: &RunId,
        status: JobRunStatus,
    ) -> Result<(), CoreError> {
        if let Some(runs) = self.job_runs.write().unwrap().get_mut(run_id) {
            for jr in runs.iter_mut() {
                if jr.status == JobRunStatus::Pending {
                    jr.status = status;
                    if status.is_terminal() {
                        jr.finished_at = Some(chrono::Utc::now());
                    }
                }
            }
        }
        Ok(())
    }

    async fn notebook_sql_blocks(&self, job: &PipelineJob) -> Result<Vec<String>, CoreError> {
        Ok(self
            .notebook_blocks
            .read()
            .unwrap()
            .get(&job.notebook_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// An in-memory notebook/cell store.
#[derive(Default)]
pub struct MemoryNotebookRepository {
    notebooks: RwLock<HashMap<NotebookId, Notebook>>,
    cells: RwLock<HashMap<NotebookId, Vec<Cell>>>,
}

impl MemoryNotebookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_notebook(&self, notebook: Notebook, cells: Vec<Cell>) {
        let id = notebook.id.clone();
        self.notebooks.write().unwrap().insert(id.clone(), notebook);
        self.cells.write().unwrap().insert(id, cells);
    }
}

#[async_trait]
impl NotebookRepository for MemoryNotebookRepository {
    async fn get_notebook(&self, id: &NotebookId) -> Result<Option<Notebook>, CoreError> {
        Ok(self.notebooks.read().unwrap().get(id).cloned())
    }

    async fn list_cells(&self, notebook_id: &NotebookId) -> Result<Vec<Cell>, CoreError> {
        let mut cells = self.cells.read().unwrap().get(notebook_id).cloned().unwrap_or_default();
        cells.sort_by_key(|c| c.position);
        Ok(cells)
    }

    async fn get_cell(&self, id: &CellId) -> Result<Option<Cell>, CoreError> {
        Ok(self
            .cells
            .read()
            .unwrap()
            .values()
            .flatten()
            .find(|c| &c.id == id)
            .cloned())
    }

    async fn store_cached_result(&self, cell_id: &CellId, result_json: String) -> Result<(), CoreError> {
        let mut cells = self.cells.write().unwrap();
        for notebook_cells in cells.values_mut() {
            if let Some(cell) = notebook_cells.iter_mut().find(|c| &c.id == cell_id) {
                cell.cached_result = Some(result_json);
                return Ok(());
            }
        }
        Err(CoreError::not_found(format!("cell {cell_id}")))
    }
}

/// An in-memory session-job store.
#[derive(Default)]
pub struct MemorySessionJobRepository {
    jobs: RwLock<HashMap<SessionJobId, SessionJob>>,
}

impl MemorySessionJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionJobRepository for MemorySessionJobRepository {
    async fn create(&self, job: SessionJob) -> Result<(), CoreError> {
        self.jobs.write().unwrap().insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &SessionJobId) -> Result<Option<SessionJob>, CoreError> {
        Ok(self.jobs.read().unwrap().get(id).cloned())
    }

    async fn update_state(
        &self,
        id: &SessionJobId,
        state: SessionJobState,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("session job {id}")))?;
        job.state = state;
        if result.is_some() {
            job.result = result;
        }
        if error.is_some() {
            job.error = error;
        }
        Ok(())
    }
}
