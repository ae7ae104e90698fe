//! Types shared between the rewriter and its callers: classification tags
//! and the result shape of a successful rewrite.

use serde::{Deserialize, Serialize};

/// Classification of a SQL statement, derived from its top-level parsed node
/// kind. Multi-statement detection runs before classification is ever
/// assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlClassification {
    /// `SELECT` / `WITH ... SELECT`.
    Read,
    /// `INSERT` / `UPDATE` / `DELETE` / `MERGE`.
    Write,
    /// `CREATE` / `DROP` / `ALTER` / `TRUNCATE`.
    Ddl,
    /// Session/utility statements: `SET`, `USE`, `SHOW`, `DESCRIBE`.
    Utility,
}

/// The product of a successful rewrite: SQL safe to execute under the
/// principal's privileges, the tables it reads, and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    pub rewritten_sql: String,
    pub tables_accessed: Vec<String>,
    pub classification: SqlClassification,
}
