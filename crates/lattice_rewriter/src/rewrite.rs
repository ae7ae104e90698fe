//! Row-filter injection and column-mask substitution (§4.1). Operates on
//! an already-parsed [`Query`] given a per-table [`TablePlan`] computed up
//! front (table resolution and policy lookups are async; AST mutation is
//! not, so all repository calls happen before any of this runs).

use crate::error::RewriteError;
use sqlparser::ast::{
    Expr, Ident, Query, Select, SelectItem, SetExpr, Statement, TableAlias, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;

/// Everything needed to rewrite occurrences of one table reference,
/// resolved once before any AST mutation begins.
#[derive(Debug, Clone, Default)]
pub struct TablePlan {
    /// The conjunction of every effective row filter bound to the calling
    /// principal, already parsed and validated (`None` if no filter
    /// applies).
    pub row_filter: Option<Expr>,
    /// Column name -> validated mask expression, for columns where the
    /// winning binding (§3's conflict resolution) is not `see_original`.
    pub column_masks: HashMap<String, Expr>,
    /// The table's full column list, in catalog order, used to expand
    /// `SELECT *`. Empty means "unknown" (catalog metadata unavailable).
    pub column_names: Vec<String>,
}

/// AND together a list of already-parsed boolean expressions. `None` if
/// the list is empty.
pub fn conjunction(exprs: Vec<Expr>) -> Option<Expr> {
    let mut iter = exprs.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| Expr::BinaryOp {
        left: Box::new(acc),
        op: sqlparser::ast::BinaryOperator::And,
        right: Box::new(next),
    }))
}

/// Apply every plan to every table reference and projection in `query`.
pub fn apply_plans(query: &mut Query, plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    rewrite_query(query, plans)
}

fn rewrite_query(query: &mut Query, plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    if let Some(with) = &mut query.with {
        for cte in &mut with.cte_tables {
            rewrite_query(&mut cte.query, plans)?;
        }
    }
    rewrite_set_expr(&mut query.body, plans)
}

fn rewrite_set_expr(set_expr: &mut SetExpr, plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    match set_expr {
        SetExpr::Select(select) => rewrite_select(select, plans),
        SetExpr::Query(q) => rewrite_query(q, plans),
        SetExpr::SetOperation { left, right, .. } => {
            rewrite_set_expr(left, plans)?;
            rewrite_set_expr(right, plans)
        }
        _ => Ok(()),
    }
}

fn rewrite_select(select: &mut Select, plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    // Named-column masking happens before wildcard expansion so the two
    // passes touch disjoint projection items and never double-apply a
    // mask to the same column.
    mask_named_columns(&mut select.projection, plans)?;

    let single_table_plan = if select.from.len() == 1 && select.from[0].joins.is_empty() {
        table_factor_plan(&select.from[0].relation, plans)
    } else {
        None
    };
    if let Some(plan) = single_table_plan {
        expand_wildcards(&mut select.projection, plan)?;
    }

    for twj in &mut select.from {
        inject_row_filter(&mut twj.relation, plans)?;
        for join in &mut twj.joins {
            inject_row_filter(&mut join.relation, plans)?;
        }
    }
    Ok(())
}

fn table_factor_plan<'a>(tf: &TableFactor, plans: &'a HashMap<String, TablePlan>) -> Option<&'a TablePlan> {
    match tf {
        TableFactor::Table { name, .. } => plans.get(&name.to_string()),
        _ => None,
    }
}

/// Replace a `*`/`table.*` wildcard with an explicit column list, applying
/// any mask that covers a given column. Fails closed: if a mask is active
/// on this table but its column list is unknown, the caller must never
/// pass a plan reaching this point with masks but no columns — enforced
/// one level up where the plan is built.
fn expand_wildcards(projection: &mut Vec<SelectItem>, plan: &TablePlan) -> Result<(), RewriteError> {
    let has_wildcard = projection.iter().any(|item| matches!(item, SelectItem::Wildcard(_)));
    if !has_wildcard {
        return Ok(());
    }
    if plan.column_names.is_empty() {
        if !plan.column_masks.is_empty() {
            return Err(RewriteError::UnresolvedTable(
                "cannot expand SELECT *: column metadata unavailable while a column mask is active"
                    .to_string(),
            ));
        }
        return Ok(());
    }

    let mut expanded = Vec::with_capacity(projection.len());
    for item in projection.drain(..) {
        if matches!(item, SelectItem::Wildcard(_)) {
            for column in &plan.column_names {
                expanded.push(make_column_item(column, plan.column_masks.get(column)));
            }
        } else {
            expanded.push(item);
        }
    }
    *projection = expanded;
    Ok(())
}

fn make_column_item(column: &str, mask: Option<&Expr>) -> SelectItem {
    match mask {
        Some(mask_expr) => SelectItem::ExprWithAlias {
            expr: mask_expr.clone(),
            alias: Ident::new(column),
        },
        None => SelectItem::UnnamedExpr(Expr::Identifier(Ident::new(column))),
    }
}

fn mask_named_columns(projection: &mut [SelectItem], plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    for item in projection.iter_mut() {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                if let Some((mask_expr, original_name)) = resolve_mask_for_expr(expr, plans) {
                    *item = SelectItem::ExprWithAlias {
                        expr: mask_expr,
                        alias: Ident::new(original_name),
                    };
                }
            }
            SelectItem::ExprWithAlias { expr, .. } => {
                if let Some((mask_expr, _)) = resolve_mask_for_expr(expr, plans) {
                    *expr = mask_expr;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn resolve_mask_for_expr(expr: &Expr, plans: &HashMap<String, TablePlan>) -> Option<(Expr, String)> {
    match expr {
        Expr::Identifier(ident) => plans.values().find_map(|plan| {
            plan.column_masks
                .get(&ident.value)
                .map(|mask_expr| (mask_expr.clone(), ident.value.clone()))
        }),
        Expr::CompoundIdentifier(parts) => {
            let column = parts.last()?.value.clone();
            let table_key = parts.first()?.value.clone();
            plans.iter().find_map(|(name, plan)| {
                let matches_table = name == &table_key || name.ends_with(&format!(".{table_key}"));
                if !matches_table {
                    return None;
                }
                plan.column_masks
                    .get(&column)
                    .map(|mask_expr| (mask_expr.clone(), column.clone()))
            })
        }
        _ => None,
    }
}

fn inject_row_filter(tf: &mut TableFactor, plans: &HashMap<String, TablePlan>) -> Result<(), RewriteError> {
    match tf {
        TableFactor::Table { name, alias, .. } => {
            let key = name.to_string();
            if let Some(plan) = plans.get(&key) {
                if let Some(predicate) = &plan.row_filter {
                    let alias_ident = alias
                        .as_ref()
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| last_ident(name));
                    let subquery = build_filtered_subquery(&key, predicate)?;
                    *tf = TableFactor::Derived {
                        lateral: false,
                        subquery: Box::new(subquery),
                        alias: Some(TableAlias {
                            name: alias_ident,
                            columns: vec![],
                        }),
                    };
                }
            }
            Ok(())
        }
        TableFactor::Derived { subquery, .. } => rewrite_query(subquery, plans),
        TableFactor::NestedJoin { table_with_joins, .. } => {
            inject_row_filter(&mut table_with_joins.relation, plans)?;
            for join in &mut table_with_joins.joins {
                inject_row_filter(&mut join.relation, plans)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn last_ident(name: &sqlparser::ast::ObjectName) -> Ident {
    name.0.last().cloned().unwrap_or_else(|| Ident::new("t"))
}

fn build_filtered_subquery(table_name: &str, predicate: &Expr) -> Result<Query, RewriteError> {
    let dialect = GenericDialect {};
    let sql = format!("SELECT * FROM {table_name}");
    let mut statements = Parser::parse_sql(&dialect, &sql)
        .map_err(|e| RewriteError::Internal(format!("failed to build filtered subquery: {e}")))?;
    let stmt = statements.remove(0);
    let mut query = match stmt {
        Statement::Query(q) => *q,
        _ => {
            return Err(RewriteError::Internal(
                "unexpected statement shape building filtered subquery".to_string(),
            ))
        }
    };
    if let SetExpr::Select(select) = query.body.as_mut() {
        select.selection = Some(predicate.clone());
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{validate_column_mask, validate_row_filter};

    fn parse_query(sql: &str) -> Query {
        let dialect = GenericDialect {};
        let mut stmts = Parser::parse_sql(&dialect, sql).unwrap();
        match stmts.remove(0) {
            Statement::Query(q) => *q,
            _ => panic!("not a query"),
        }
    }

    #[test]
    fn injects_row_filter_into_from_clause() {
        let mut query = parse_query("SELECT total FROM sales");
        let mut plans = HashMap::new();
        plans.insert(
            "sales".to_string(),
            TablePlan {
                row_filter: Some(validate_row_filter("country = 'US'").unwrap()),
                ..Default::default()
            },
        );
        apply_plans(&mut query, &plans).unwrap();
        let rendered = Statement::Query(Box::new(query)).to_string();
        assert!(rendered.contains("FROM (SELECT * FROM sales WHERE country = 'US') AS sales"));
    }

    #[test]
    fn expands_wildcard_with_mask() {
        let mut query = parse_query("SELECT * FROM users");
        let mut plans = HashMap::new();
        let mut masks = HashMap::new();
        masks.insert(
            "ssn".to_string(),
            validate_column_mask("'***-**-' || RIGHT(ssn, 4)").unwrap(),
        );
        plans.insert(
            "users".to_string(),
            TablePlan {
                row_filter: None,
                column_masks: masks,
                column_names: vec!["id".to_string(), "ssn".to_string(), "email".to_string()],
            },
        );
        apply_plans(&mut query, &plans).unwrap();
        let rendered = Statement::Query(Box::new(query)).to_string();
        assert!(rendered.contains("id"));
        assert!(rendered.contains("AS ssn"));
        assert!(rendered.contains("email"));
        assert!(!rendered.contains("SELECT id, ssn, email"));
    }

    #[test]
    fn wildcard_without_column_metadata_but_active_mask_is_rejected() {
        let mut query = parse_query("SELECT * FROM users");
        let mut plans = HashMap::new();
        let mut masks = HashMap::new();
        masks.insert("ssn".to_string(), validate_column_mask("'masked'").unwrap());
        plans.insert(
            "users".to_string(),
            TablePlan {
                row_filter: None,
                column_masks: masks,
                column_names: vec![],
            },
        );
        let err = apply_plans(&mut query, &plans).unwrap_err();
        assert!(matches!(err, RewriteError::UnresolvedTable(_)));
    }
}
