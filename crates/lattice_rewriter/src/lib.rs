//! SQL Rewriter and Authorization Filter (§4.1).
//!
//! Given `(principal, sql_text)`, produces either an `(rewritten_sql,
//! tables_accessed)` pair safe to execute under the principal's
//! privileges, or an error classifying the failure. Stateless per call:
//! every [`Rewriter::rewrite`] invocation is independent and may run with
//! unbounded parallelism (§5).

mod classify;
mod error;
mod extract;
mod rewrite;
mod safety;

pub use error::RewriteError;
pub use rewrite::TablePlan;

use lattice_domain::catalog::minimum_privilege_for;
use lattice_domain::{
    AuditEntry, CoreError, OperationContext, Privilege, RewriteOutcome, SqlClassification,
};
use lattice_repository::{AuditSink, CatalogRepository, GrantRepository, PolicyRepository};
use rewrite::conjunction;
use sqlparser::ast::Statement;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// The rewriter's repository dependencies, bundled so `Rewriter::new`
/// takes one argument instead of four.
pub struct RewriterDeps {
    pub catalog: Arc<dyn CatalogRepository>,
    pub policy: Arc<dyn PolicyRepository>,
    pub grants: Arc<dyn GrantRepository>,
    pub audit: Arc<dyn AuditSink>,
}

/// Stateless SQL rewriter and authorization filter.
pub struct Rewriter {
    deps: RewriterDeps,
    default_schema: String,
}

impl Rewriter {
    pub fn new(deps: RewriterDeps, default_schema: impl Into<String>) -> Self {
        Self {
            deps,
            default_schema: default_schema.into(),
        }
    }

    /// Parse, authorize, and rewrite one SQL statement on behalf of
    /// `ctx`'s principal. See module docs and §4.1 for the full contract.
    pub async fn rewrite(&self, ctx: &OperationContext, sql: &str) -> Result<RewriteOutcome, CoreError> {
        match self.rewrite_inner(ctx, sql).await {
            Ok(outcome) => {
                let principal = ctx.principal().map(|p| p.name.as_str()).unwrap_or("unknown");
                self.deps
                    .audit
                    .record(AuditEntry::allowed_execute(
                        principal,
                        sql,
                        outcome.rewritten_sql.clone(),
                        outcome.tables_accessed.clone(),
                    ))
                    .await;
                Ok(outcome)
            }
            Err(err) => {
                let principal = ctx.principal().map(|p| p.name.as_str()).unwrap_or("unknown");
                if !matches!(err, RewriteError::MultiStatement | RewriteError::Unparseable(_)) {
                    self.deps
                        .audit
                        .record(AuditEntry::denied_execute(principal, sql, err.to_string()))
                        .await;
                }
                Err(err.into())
            }
        }
    }

    async fn rewrite_inner(&self, ctx: &OperationContext, sql: &str) -> Result<RewriteOutcome, RewriteError> {
        let principal = ctx
            .principal()
            .ok_or_else(|| RewriteError::AccessDenied("no authenticated principal".to_string()))?;

        // Multi-statement rejection and parse validation run before
        // anything else, including the admin bypass — per §4.1, "All
        // other steps (multi-statement rejection, parse validation) still
        // apply" even for admins.
        let stmt = classify::parse_single_statement(sql)?;
        let classification = classify::classify(&stmt);

        if principal.is_admin {
            let tables_accessed = extract_physical_tables(&stmt);
            return Ok(RewriteOutcome {
                rewritten_sql: sql.to_string(),
                tables_accessed,
                classification,
            });
        }

        match classification {
            SqlClassification::Utility => Ok(RewriteOutcome {
                rewritten_sql: stmt.to_string(),
                tables_accessed: Vec::new(),
                classification,
            }),
            SqlClassification::Read => self.rewrite_read(principal_name(ctx)?, stmt, classification).await,
            SqlClassification::Write | SqlClassification::Ddl => {
                self.authorize_only(principal_name(ctx)?, &stmt, classification).await?;
                Ok(RewriteOutcome {
                    rewritten_sql: stmt.to_string(),
                    tables_accessed: extract_physical_tables(&stmt),
                    classification,
                })
            }
        }
    }

    async fn rewrite_read(
        &self,
        principal_name: &str,
        stmt: Statement,
        classification: SqlClassification,
    ) -> Result<RewriteOutcome, RewriteError> {
        let mut query = match stmt {
            Statement::Query(q) => *q,
            other => {
                return Err(RewriteError::Internal(format!(
                    "READ classification did not produce a Query: {other}"
                )))
            }
        };

        let cte_names: HashSet<String> = extract::collect_cte_names(&query).into_iter().collect();
        let raw_names = extract::collect_table_names(&query);
        let physical_names: Vec<&str> = raw_names
            .iter()
            .map(String::as_str)
            .filter(|n| !cte_names.contains(*n))
            .collect();

        let mut plans: HashMap<String, TablePlan> = HashMap::new();
        let mut tables_accessed = Vec::new();

        for name in &physical_names {
            let resolved = self
                .deps
                .catalog
                .resolve_table(name, &self.default_schema)
                .await?
                .ok_or_else(|| RewriteError::UnresolvedTable(format!("unknown table: {name}")))?;

            let has_select = self
                .deps
                .grants
                .has_privilege(principal_name, &resolved.table_id, Privilege::Select)
                .await?;
            if !has_select {
                return Err(RewriteError::AccessDenied(format!(
                    "{principal_name} lacks SELECT on {}",
                    resolved.qualified_name
                )));
            }

            let row_filters = self
                .deps
                .policy
                .effective_row_filters(principal_name, &resolved.table_id)
                .await?;
            let mut validated_predicates = Vec::with_capacity(row_filters.len());
            for filter in &row_filters {
                validated_predicates.push(safety::validate_row_filter(&filter.predicate_sql)?);
            }

            let effective_masks = self
                .deps
                .policy
                .effective_column_masks(principal_name, &resolved.table_id)
                .await?;
            let mut column_masks = HashMap::new();
            for effective in &effective_masks {
                let winner = lattice_domain::resolve_mask_conflict(effective.bindings.iter());
                let Some(winner) = winner else { continue };
                if winner.see_original {
                    continue;
                }
                let mask_expr = safety::validate_column_mask(&effective.mask.mask_expression)?;
                column_masks.insert(effective.mask.column_name.clone(), mask_expr);
            }

            tables_accessed.push(resolved.qualified_name.clone());
            plans.insert(
                name.to_string(),
                TablePlan {
                    row_filter: conjunction(validated_predicates),
                    column_masks,
                    column_names: resolved.column_names,
                },
            );
        }

        rewrite::apply_plans(&mut query, &plans)?;
        let rewritten_sql = Statement::Query(Box::new(query)).to_string();

        Ok(RewriteOutcome {
            rewritten_sql,
            tables_accessed,
            classification,
        })
    }

    async fn authorize_only(
        &self,
        principal_name: &str,
        stmt: &Statement,
        classification: SqlClassification,
    ) -> Result<(), RewriteError> {
        let required = required_privilege(classification, stmt);
        let Some(required) = required else { return Ok(()) };

        let query_for_extraction = match stmt {
            Statement::Query(q) => Some(q.as_ref()),
            _ => None,
        };
        let names = query_for_extraction
            .map(extract::collect_table_names)
            .unwrap_or_else(|| extract_physical_tables(stmt));

        for name in &names {
            let resolved = self
                .deps
                .catalog
                .resolve_table(name, &self.default_schema)
                .await?
                .ok_or_else(|| RewriteError::UnresolvedTable(format!("unknown table: {name}")))?;
            let allowed = self
                .deps
                .grants
                .has_privilege(principal_name, &resolved.table_id, required)
                .await?;
            if !allowed {
                return Err(RewriteError::AccessDenied(format!(
                    "{principal_name} lacks {required:?} on {}",
                    resolved.qualified_name
                )));
            }
        }
        Ok(())
    }
}

fn principal_name(ctx: &OperationContext) -> Result<&str, RewriteError> {
    ctx.principal()
        .map(|p| p.name.as_str())
        .ok_or_else(|| RewriteError::AccessDenied("no authenticated principal".to_string()))
}

/// Best-effort table name extraction for statement kinds the rewriter
/// does not rewrite (WRITE/DDL targets, or any statement reached via the
/// admin bypass). Uses the same FROM-clause walker where the statement
/// wraps a `Query`; otherwise returns no names rather than guessing at
/// engine-specific target syntax.
fn extract_physical_tables(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::Query(q) => extract::collect_table_names(q),
        _ => {
            warn!("table extraction not implemented for this statement kind; tables_accessed will be empty");
            Vec::new()
        }
    }
}

/// The minimum privilege a classification requires on each referenced
/// securable, resolved per-statement for DDL since CREATE_TABLE,
/// CREATE_SCHEMA, and CREATE_VIEW are distinct privileges (§4.1).
fn required_privilege(classification: SqlClassification, stmt: &Statement) -> Option<Privilege> {
    match classification {
        SqlClassification::Read | SqlClassification::Write => minimum_privilege_for(classification),
        SqlClassification::Ddl => Some(match stmt {
            Statement::CreateTable { .. } => Privilege::CreateTable,
            Statement::CreateSchema { .. } => Privilege::CreateSchema,
            Statement::CreateView { .. } => Privilege::CreateView,
            _ => Privilege::Manage,
        }),
        SqlClassification::Utility => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_domain::{Principal, SecurableKind};
    use lattice_repository::memory::{
        MemoryAuditSink, MemoryCatalogRepository, MemoryGrantRepository, MemoryPolicyRepository,
    };

    fn rewriter_with(
        catalog: Arc<MemoryCatalogRepository>,
        grants: Arc<MemoryGrantRepository>,
        policy: Arc<MemoryPolicyRepository>,
        audit: Arc<MemoryAuditSink>,
    ) -> Rewriter {
        Rewriter::new(
            RewriterDeps {
                catalog,
                policy,
                grants,
                audit,
            },
            "main",
        )
    }

    #[tokio::test]
    async fn row_filter_is_injected_and_audited() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let table_id = catalog.add_table("main", "sales", vec!["total", "country"]);
        let grants = Arc::new(MemoryGrantRepository::new());
        grants.grant("alice", table_id.clone(), Privilege::Select);
        let policy = Arc::new(MemoryPolicyRepository::new());
        policy.add_row_filter(
            lattice_domain::RowFilter::new(table_id, "country = 'US'"),
            vec!["alice".to_string()],
        );
        let audit = Arc::new(MemoryAuditSink::new());

        let rewriter = rewriter_with(catalog, grants, policy, audit.clone());
        let ctx = OperationContext::new(Principal::user("alice"));
        let outcome = rewriter.rewrite(&ctx, "SELECT total FROM sales").await.unwrap();

        assert!(outcome.rewritten_sql.contains("WHERE country = 'US'"));
        assert_eq!(outcome.tables_accessed, vec!["main.sales".to_string()]);
        assert_eq!(audit.entries().len(), 1);
        assert_eq!(audit.entries()[0].status, lattice_domain::AuditStatus::Allowed);
    }

    #[tokio::test]
    async fn mask_on_select_star_hides_column() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let table_id = catalog.add_table("main", "users", vec!["id", "ssn", "email"]);
        let grants = Arc::new(MemoryGrantRepository::new());
        grants.grant("alice", table_id.clone(), Privilege::Select);
        let policy = Arc::new(MemoryPolicyRepository::new());
        let mask = lattice_domain::ColumnMask::new(table_id, "ssn", "'***-**-' || RIGHT(ssn, 4)");
        let binding = lattice_domain::ColumnMaskBinding {
            mask_id: mask.id.clone(),
            principal_ref: "alice".into(),
            see_original: false,
        };
        policy.add_column_mask(mask, vec![binding]);
        let audit = Arc::new(MemoryAuditSink::new());

        let rewriter = rewriter_with(catalog, grants, policy, audit);
        let ctx = OperationContext::new(Principal::user("alice"));
        let outcome = rewriter.rewrite(&ctx, "SELECT * FROM users").await.unwrap();

        assert!(outcome.rewritten_sql.contains("AS ssn"));
        assert!(!outcome.rewritten_sql.contains("id, ssn, email"));
    }

    #[tokio::test]
    async fn multi_statement_input_is_rejected_before_rewrite() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let grants = Arc::new(MemoryGrantRepository::new());
        let policy = Arc::new(MemoryPolicyRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let rewriter = rewriter_with(catalog, grants, policy, audit.clone());
        let ctx = OperationContext::new(Principal::user("alice"));

        let err = rewriter
            .rewrite(&ctx, "SELECT 1; DROP TABLE foo")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(audit.entries().is_empty(), "multi-statement rejection is not audited");
    }

    #[tokio::test]
    async fn admin_bypasses_authorization_but_not_multistatement_check() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        catalog.add_table("main", "secret", vec!["x"]);
        let grants = Arc::new(MemoryGrantRepository::new());
        let policy = Arc::new(MemoryPolicyRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let rewriter = rewriter_with(catalog, grants, policy, audit);
        let ctx = OperationContext::new(Principal::admin("root"));

        let outcome = rewriter.rewrite(&ctx, "SELECT * FROM secret").await.unwrap();
        assert_eq!(outcome.rewritten_sql, "SELECT * FROM secret");

        let err = rewriter.rewrite(&ctx, "SELECT 1; SELECT 2").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn unsafe_row_filter_fails_closed_and_is_audited() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        let table_id = catalog.add_table("main", "sales", vec!["total"]);
        let grants = Arc::new(MemoryGrantRepository::new());
        grants.grant("alice", table_id.clone(), Privilege::Select);
        let policy = Arc::new(MemoryPolicyRepository::new());
        policy.add_row_filter(
            lattice_domain::RowFilter::new(table_id, "id IN (SELECT id FROM other)"),
            vec!["alice".to_string()],
        );
        let audit = Arc::new(MemoryAuditSink::new());
        let rewriter = rewriter_with(catalog, grants, policy, audit.clone());
        let ctx = OperationContext::new(Principal::user("alice"));

        let err = rewriter.rewrite(&ctx, "SELECT total FROM sales").await.unwrap_err();
        assert!(matches!(err, CoreError::UnsafeExpression(_)));
        assert_eq!(audit.entries()[0].status, lattice_domain::AuditStatus::Denied);
    }

    #[tokio::test]
    async fn access_denied_without_select_privilege() {
        let catalog = Arc::new(MemoryCatalogRepository::new());
        catalog.add_table("main", "sales", vec!["total"]);
        let grants = Arc::new(MemoryGrantRepository::new());
        let policy = Arc::new(MemoryPolicyRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let rewriter = rewriter_with(catalog, grants, policy, audit);
        let ctx = OperationContext::new(Principal::user("bob"));

        let err = rewriter.rewrite(&ctx, "SELECT total FROM sales").await.unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));
    }
}
