//! Notebook/cell persistence the session manager and orchestrator both
//! read (the orchestrator only for a job's ordered SQL blocks, see
//! [`crate::pipeline::PipelineRepository::notebook_sql_blocks`]; the
//! session manager for interactive cell execution below).

use async_trait::async_trait;
use lattice_domain::{Cell, CoreError, Notebook};
use lattice_ids::{CellId, NotebookId};

#[async_trait]
pub trait NotebookRepository: Send + Sync {
    async fn get_notebook(&self, id: &NotebookId) -> Result<Option<Notebook>, CoreError>;

    /// Cells in position order.
    async fn list_cells(&self, notebook_id: &NotebookId) -> Result<Vec<Cell>, CoreError>;

    async fn get_cell(&self, id: &CellId) -> Result<Option<Cell>, CoreError>;

    /// Persist a cell's JSON-serialized execution result as its cached
    /// result (§4.3's ExecuteCell: "Persists the JSON-serialized result
    /// back to the cell").
    async fn store_cached_result(&self, cell_id: &CellId, result_json: String) -> Result<(), CoreError>;
}
