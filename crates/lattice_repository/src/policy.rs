//! Row filters and column masks: `(principal, table_id) -> effective
//! predicate set / mask map`.

use async_trait::async_trait;
use lattice_domain::{ColumnMask, ColumnMaskBinding, CoreError, RowFilter};
use lattice_ids::SecurableId;

/// A row filter bound to the calling principal, resolved from its own
/// binding (the binding carries no data beyond the reference, so this is
/// just the filter).
pub type EffectiveRowFilter = RowFilter;

/// A column mask together with every binding that applies to the calling
/// principal (possibly more than one — conflict resolution is the caller's
/// job via [`lattice_domain::resolve_mask_conflict`]).
#[derive(Debug, Clone)]
pub struct EffectiveColumnMask {
    pub mask: ColumnMask,
    pub bindings: Vec<ColumnMaskBinding>,
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Effective row filters bound to `principal_name` on `table_id`
    /// (union over the principal and its groups). Multiple filters combine
    /// conjunctively — that's the rewriter's job, not this query's.
    async fn effective_row_filters(
        &self,
        principal_name: &str,
        table_id: &SecurableId,
    ) -> Result<Vec<EffectiveRowFilter>, CoreError>;

    /// Effective column masks on `table_id`, keyed by column name, each
    /// carrying every binding applicable to `principal_name` so the caller
    /// can apply §3's conflict-resolution tie-break.
    async fn effective_column_masks(
        &self,
        principal_name: &str,
        table_id: &SecurableId,
    ) -> Result<Vec<EffectiveColumnMask>, CoreError>;
}
