//! Catalog resolution: a qualified or unqualified table name ->
//! `(table_id, schema_id, column_names)`.

use async_trait::async_trait;
use lattice_domain::CoreError;
use lattice_ids::SecurableId;

/// The catalog's answer to "what table does this name refer to".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub table_id: SecurableId,
    pub schema_id: SecurableId,
    /// Fully qualified `catalog.schema.table`, used for audit's
    /// `tables_accessed`.
    pub qualified_name: String,
    pub column_names: Vec<String>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Resolve a table reference, qualified (`catalog.schema.table`) or
    /// unqualified (resolved against `default_schema`). `None` if the name
    /// does not resolve to a known table.
    async fn resolve_table(
        &self,
        name: &str,
        default_schema: &str,
    ) -> Result<Option<ResolvedTable>, CoreError>;
}
