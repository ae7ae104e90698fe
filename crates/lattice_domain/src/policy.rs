//! Row filters and column masks: the predicates and projections the
//! rewriter injects into a query on a principal's behalf.

use crate::catalog::PrincipalRef;
use lattice_ids::{ColumnMaskId, RowFilterId, SecurableId};
use serde::{Deserialize, Serialize};

/// `(id, table_id, predicate_sql, description)`.
///
/// `predicate_sql` must parse as a standalone boolean expression and contain
/// no subqueries, no semicolons, no DDL tokens — enforced by the rewriter's
/// validation step, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    pub id: RowFilterId,
    pub table_id: SecurableId,
    pub predicate_sql: String,
    pub description: Option<String>,
}

impl RowFilter {
    pub fn new(table_id: SecurableId, predicate_sql: impl Into<String>) -> Self {
        Self {
            id: RowFilterId::new(),
            table_id,
            predicate_sql: predicate_sql.into(),
            description: None,
        }
    }
}

/// `(filter_id, principal_ref)`. A principal's effective row filters on a
/// table is the set of predicates bound to that principal or any of its
/// groups; multiple predicates combine conjunctively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilterBinding {
    pub filter_id: RowFilterId,
    pub principal_ref: PrincipalRef,
}

/// `(id, table_id, column_name, mask_expression, description)`.
///
/// `mask_expression` is a scalar SQL expression; same validation invariant
/// as [`RowFilter::predicate_sql`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMask {
    pub id: ColumnMaskId,
    pub table_id: SecurableId,
    pub column_name: String,
    pub mask_expression: String,
    pub description: Option<String>,
}

impl ColumnMask {
    pub fn new(
        table_id: SecurableId,
        column_name: impl Into<String>,
        mask_expression: impl Into<String>,
    ) -> Self {
        Self {
            id: ColumnMaskId::new(),
            table_id,
            column_name: column_name.into(),
            mask_expression: mask_expression.into(),
            description: None,
        }
    }
}

/// `(mask_id, principal_ref, see_original)`.
///
/// If `see_original` holds for the caller on a mask, the original column
/// value is returned; otherwise the mask expression is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMaskBinding {
    pub mask_id: ColumnMaskId,
    pub principal_ref: PrincipalRef,
    pub see_original: bool,
}

/// Resolve which of several applicable bindings wins for one principal on
/// one column.
///
/// Conflict resolution: `see_original=true` wins over any mask; otherwise
/// the binding with the smallest mask id is used (a deterministic
/// tie-break — an implementation may warn on the conflict but must never
/// deviate from this ordering).
pub fn resolve_mask_conflict<'a>(
    bindings: impl IntoIterator<Item = &'a ColumnMaskBinding>,
) -> Option<&'a ColumnMaskBinding> {
    let mut winner: Option<&ColumnMaskBinding> = None;
    for binding in bindings {
        winner = Some(match winner {
            None => binding,
            Some(current) => {
                if current.see_original {
                    current
                } else if binding.see_original {
                    binding
                } else if binding.mask_id < current.mask_id {
                    binding
                } else {
                    current
                }
            }
        });
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(mask_id: &str, see_original: bool) -> ColumnMaskBinding {
        ColumnMaskBinding {
            mask_id: ColumnMaskId::parse(mask_id).unwrap(),
            principal_ref: PrincipalRef("alice".into()),
            see_original,
        }
    }

    #[test]
    fn see_original_wins_over_any_mask() {
        let a = binding("00000000-0000-0000-0000-000000000001", false);
        let b = binding("00000000-0000-0000-0000-000000000002", true);
        let winner = resolve_mask_conflict([&a, &b]).unwrap();
        assert!(winner.see_original);
    }

    #[test]
    fn smallest_mask_id_wins_when_no_see_original() {
        let a = binding("00000000-0000-0000-0000-000000000002", false);
        let b = binding("00000000-0000-0000-0000-000000000001", false);
        let winner = resolve_mask_conflict([&a, &b]).unwrap();
        assert_eq!(winner.mask_id, b.mask_id);
    }
}
