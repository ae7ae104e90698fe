//! Notebooks and the cells they own — both the unit of interactive
//! execution (Session Manager) and the unit a pipeline job runs
//! (Orchestrator fetches a job's notebook's SQL blocks in order).

use lattice_ids::{CellId, NotebookId};
use serde::{Deserialize, Serialize};

/// `(id, name, owner, description?)`. Owns an ordered sequence of [`Cell`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: NotebookId,
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
}

impl Notebook {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: NotebookId::new(),
            name: name.into(),
            owner: owner.into(),
            description: None,
        }
    }
}

/// `cell_type` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellType {
    Sql,
    Markdown,
}

/// `(id, notebook_id, cell_type, content, position, cached_result?)`.
///
/// Invariant (enforced by the owning notebook's reorder operation, not by
/// this type in isolation): within a notebook, positions form a contiguous
/// permutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub notebook_id: NotebookId,
    pub cell_type: CellType,
    pub content: String,
    pub position: u32,
    pub cached_result: Option<String>,
}

impl Cell {
    pub fn sql(notebook_id: NotebookId, content: impl Into<String>, position: u32) -> Self {
        Self {
            id: CellId::new(),
            notebook_id,
            cell_type: CellType::Sql,
            content: content.into(),
            position,
            cached_result: None,
        }
    }
}

/// Verify that a notebook's cells hold a contiguous permutation of
/// positions `0..cells.len()`.
pub fn positions_are_contiguous(cells: &[Cell]) -> bool {
    let mut positions: Vec<u32> = cells.iter().map(|c| c.position).collect();
    positions.sort_unstable();
    positions.iter().enumerate().all(|(idx, pos)| idx as u32 == *pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_gap_in_positions() {
        let nb = NotebookId::new();
        let cells = vec![Cell::sql(nb.clone(), "select 1", 0), Cell::sql(nb, "select 2", 2)];
        assert!(!positions_are_contiguous(&cells));
    }

    #[test]
    fn accepts_contiguous_positions() {
        let nb = NotebookId::new();
        let cells = vec![
            Cell::sql(nb.clone(), "select 1", 1),
            Cell::sql(nb, "select 2", 0),
        ];
        assert!(positions_are_contiguous(&cells));
    }
}
