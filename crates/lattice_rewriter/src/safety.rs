//! Validation for row-filter predicates and column-mask expressions:
//! `predicate_sql`/`mask_expression` must parse as a standalone expression
//! and must not smuggle a subquery, a DDL token, or a statement separator
//! (§3, §4.1). Failing any of these is never a warning — the whole
//! rewrite fails with `UnsafeExpression` (§4.1, §7).

use crate::error::RewriteError;
use sqlparser::ast::{Expr, Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

const DDL_TOKENS: &[&str] = &[
    "CREATE", "DROP", "ALTER", "TRUNCATE", "INSERT", "UPDATE", "DELETE", "GRANT", "REVOKE",
];

/// Parse `predicate_sql` as the WHERE-clause of `SELECT 1 WHERE <expr>` and
/// return the parsed boolean [`Expr`] if it's safe to inject.
pub fn validate_row_filter(predicate_sql: &str) -> Result<Expr, RewriteError> {
    reject_unsafe_tokens(predicate_sql)?;
    let sql = format!("SELECT 1 WHERE {predicate_sql}");
    let stmt = parse_one(&sql)?;
    let query = as_query(&stmt)?;
    let select = as_select(query)?;
    select.selection.clone().ok_or_else(|| {
        RewriteError::UnsafeExpression(format!("row filter did not parse as an expression: {predicate_sql}"))
    })
}

/// Parse `mask_expression` as the projection of `SELECT <expr>` and return
/// the parsed scalar [`Expr`] if it's safe to substitute.
pub fn validate_column_mask(mask_expression: &str) -> Result<Expr, RewriteError> {
    reject_unsafe_tokens(mask_expression)?;
    let sql = format!("SELECT {mask_expression}");
    let stmt = parse_one(&sql)?;
    let query = as_query(&stmt)?;
    let select = as_select(query)?;
    match select.projection.first() {
        Some(sqlparser::ast::SelectItem::UnnamedExpr(expr)) => Ok(expr.clone()),
        Some(sqlparser::ast::SelectItem::ExprWithAlias { expr, .. }) => Ok(expr.clone()),
        _ => Err(RewriteError::UnsafeExpression(format!(
            "column mask did not parse as a scalar expression: {mask_expression}"
        ))),
    }
}

fn parse_one(sql: &str) -> Result<Statement, RewriteError> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| RewriteError::UnsafeExpression(format!("failed to parse policy expression: {e}")))?;
    if statements.len() != 1 {
        return Err(RewriteError::UnsafeExpression(
            "policy expression contains multiple statements".to_string(),
        ));
    }
    Ok(statements.remove(0))
}

fn as_query(stmt: &Statement) -> Result<&Query, RewriteError> {
    match stmt {
        Statement::Query(q) => Ok(q),
        _ => Err(RewriteError::UnsafeExpression(
            "policy expression is not a scalar/boolean expression".to_string(),
        )),
    }
}

fn as_select(query: &Query) -> Result<&sqlparser::ast::Select, RewriteError> {
    match query.body.as_ref() {
        SetExpr::Select(select) => Ok(select.as_ref()),
        _ => Err(RewriteError::UnsafeExpression(
            "policy expression is not a simple SELECT".to_string(),
        )),
    }
}

/// Reject subqueries, DDL tokens, and multi-statement separators before
/// even attempting a real parse — belt and suspenders against any pattern
/// that might parse as something other than a plain expression.
fn reject_unsafe_tokens(expr_sql: &str) -> Result<(), RewriteError> {
    if expr_sql.contains(';') {
        return Err(RewriteError::UnsafeExpression(
            "policy expression contains a statement separator".to_string(),
        ));
    }
    let upper = expr_sql.to_ascii_uppercase();
    for token in DDL_TOKENS {
        if contains_word(&upper, token) {
            return Err(RewriteError::UnsafeExpression(format!(
                "policy expression contains forbidden keyword: {token}"
            )));
        }
    }
    if contains_word(&upper, "SELECT") {
        return Err(RewriteError::UnsafeExpression(
            "policy expression contains a subquery".to_string(),
        ));
    }
    Ok(())
}

fn contains_word(haystack_upper: &str, word: &str) -> bool {
    haystack_upper
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|tok| tok == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_boolean_predicate() {
        assert!(validate_row_filter("country = 'US'").is_ok());
    }

    #[test]
    fn rejects_predicate_with_subquery() {
        let err = validate_row_filter("id IN (SELECT id FROM other)").unwrap_err();
        assert!(matches!(err, RewriteError::UnsafeExpression(_)));
    }

    #[test]
    fn rejects_predicate_with_semicolon() {
        let err = validate_row_filter("1=1; DROP TABLE t").unwrap_err();
        assert!(matches!(err, RewriteError::UnsafeExpression(_)));
    }

    #[test]
    fn rejects_ddl_token() {
        let err = validate_row_filter("1=1 OR (DROP TABLE t IS NULL)").unwrap_err();
        assert!(matches!(err, RewriteError::UnsafeExpression(_)));
    }

    #[test]
    fn accepts_scalar_mask_expression() {
        assert!(validate_column_mask("'***-**-' || RIGHT(ssn, 4)").is_ok());
    }
}
