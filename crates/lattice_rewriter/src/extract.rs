//! Read-only table-reference extraction, used both for `tables_accessed`
//! and as the first pass before any mutation: every distinct table name
//! referenced anywhere in the statement (FROM, JOIN, derived subqueries,
//! CTEs, nested joins) is collected before resolution begins.

use sqlparser::ast::{Query, Select, SetExpr, TableFactor, TableWithJoins};

/// Collect every distinct table name as written (e.g. `sales` or
/// `analytics.sales`), in first-seen order. Includes CTE names referenced
/// from an outer query — callers resolving names against a real catalog
/// must first subtract [`collect_cte_names`], since a CTE alias is a
/// query-local binding, not a securable.
pub fn collect_table_names(query: &Query) -> Vec<String> {
    let mut names = Vec::new();
    walk_query(query, &mut |name| {
        if !names.iter().any(|n: &String| n == name) {
            names.push(name.to_string());
        }
    });
    names
}

/// Collect the names every CTE in `query` binds (recursively, since a CTE
/// body may itself define CTEs).
pub fn collect_cte_names(query: &Query) -> Vec<String> {
    let mut names = Vec::new();
    walk_cte_names(query, &mut names);
    names
}

fn walk_cte_names(query: &Query, names: &mut Vec<String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            names.push(cte.alias.name.value.clone());
            walk_cte_names(&cte.query, names);
        }
    }
    if let SetExpr::Select(select) = &query.body.as_ref() {
        for twj in &select.from {
            walk_cte_names_in_table_factor(&twj.relation, names);
            for join in &twj.joins {
                walk_cte_names_in_table_factor(&join.relation, names);
            }
        }
    }
}

fn walk_cte_names_in_table_factor(tf: &TableFactor, names: &mut Vec<String>) {
    if let TableFactor::Derived { subquery, .. } = tf {
        walk_cte_names(subquery, names);
    }
    if let TableFactor::NestedJoin { table_with_joins, .. } = tf {
        walk_cte_names_in_table_factor(&table_with_joins.relation, names);
        for join in &table_with_joins.joins {
            walk_cte_names_in_table_factor(&join.relation, names);
        }
    }
}

fn walk_query(query: &Query, visit: &mut impl FnMut(&str)) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            walk_query(&cte.query, visit);
        }
    }
    walk_set_expr(&query.body, visit);
}

fn walk_set_expr(set_expr: &SetExpr, visit: &mut impl FnMut(&str)) {
    match set_expr {
        SetExpr::Select(select) => walk_select(select, visit),
        SetExpr::Query(q) => walk_query(q, visit),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, visit);
            walk_set_expr(right, visit);
        }
        _ => {}
    }
}

fn walk_select(select: &Select, visit: &mut impl FnMut(&str)) {
    for twj in &select.from {
        walk_table_with_joins(twj, visit);
    }
}

fn walk_table_with_joins(twj: &TableWithJoins, visit: &mut impl FnMut(&str)) {
    walk_table_factor(&twj.relation, visit);
    for join in &twj.joins {
        walk_table_factor(&join.relation, visit);
    }
}

fn walk_table_factor(tf: &TableFactor, visit: &mut impl FnMut(&str)) {
    match tf {
        TableFactor::Table { name, .. } => visit(&name.to_string()),
        TableFactor::Derived { subquery, .. } => walk_query(subquery, visit),
        TableFactor::NestedJoin { table_with_joins, .. } => {
            walk_table_with_joins(table_with_joins, visit)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_query(sql: &str) -> Query {
        let dialect = GenericDialect {};
        let mut stmts = Parser::parse_sql(&dialect, sql).unwrap();
        match stmts.remove(0) {
            sqlparser::ast::Statement::Query(q) => *q,
            _ => panic!("not a query"),
        }
    }

    #[test]
    fn collects_single_table() {
        let q = parse_query("SELECT * FROM sales");
        assert_eq!(collect_table_names(&q), vec!["sales".to_string()]);
    }

    #[test]
    fn collects_join_tables() {
        let q = parse_query("SELECT * FROM sales s JOIN regions r ON s.region_id = r.id");
        assert_eq!(
            collect_table_names(&q),
            vec!["sales".to_string(), "regions".to_string()]
        );
    }

    #[test]
    fn collects_from_derived_subquery() {
        let q = parse_query("SELECT * FROM (SELECT * FROM sales) sub");
        assert_eq!(collect_table_names(&q), vec!["sales".to_string()]);
    }

    #[test]
    fn collects_from_cte() {
        // The CTE body is walked first, then the outer query's reference to
        // the CTE name itself shows up as a (non-physical) table name too —
        // resolution against the catalog is what filters that out later.
        let q = parse_query("WITH recent AS (SELECT * FROM sales) SELECT * FROM recent");
        assert_eq!(
            collect_table_names(&q),
            vec!["sales".to_string(), "recent".to_string()]
        );
    }
}
