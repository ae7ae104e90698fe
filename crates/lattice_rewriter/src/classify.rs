//! Statement-count and classification rules (§4.1): multi-statement
//! detection runs before classification is ever assigned.

use crate::error::RewriteError;
use lattice_domain::SqlClassification;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parse `sql` and require it to be exactly one statement. Returns
/// [`RewriteError::MultiStatement`] for zero or more-than-one statements
/// (an empty or whitespace-only input is not a valid single statement
/// either) and [`RewriteError::Unparseable`] if parsing fails outright.
pub fn parse_single_statement(sql: &str) -> Result<Statement, RewriteError> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| RewriteError::Unparseable(e.to_string()))?;
    match statements.len() {
        1 => Ok(statements.into_iter().next().unwrap()),
        _ => Err(RewriteError::MultiStatement),
    }
}

/// Derive a [`SqlClassification`] from a statement's top-level node kind.
pub fn classify(stmt: &Statement) -> SqlClassification {
    match stmt {
        Statement::Query(_) => SqlClassification::Read,
        Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
            SqlClassification::Write
        }
        Statement::CreateTable { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::Drop { .. }
        | Statement::AlterTable { .. }
        | Statement::Truncate { .. } => SqlClassification::Ddl,
        _ => SqlClassification::Utility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_select_classifies_read() {
        let stmt = parse_single_statement("SELECT 1").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Read);
    }

    #[test]
    fn cte_select_classifies_read() {
        let stmt = parse_single_statement("WITH x AS (SELECT 1) SELECT * FROM x").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Read);
    }

    #[test]
    fn insert_classifies_write() {
        let stmt = parse_single_statement("INSERT INTO t (a) VALUES (1)").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Write);
    }

    #[test]
    fn create_table_classifies_ddl() {
        let stmt = parse_single_statement("CREATE TABLE t (a INT)").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Ddl);
    }

    #[test]
    fn set_classifies_utility() {
        let stmt = parse_single_statement("SET a = 1").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Utility);
    }

    #[test]
    fn semicolon_separated_statements_rejected() {
        let err = parse_single_statement("SELECT 1; DROP TABLE foo").unwrap_err();
        assert!(matches!(err, RewriteError::MultiStatement));
    }

    #[test]
    fn trailing_semicolon_alone_is_fine() {
        let stmt = parse_single_statement("SELECT 1;").unwrap();
        assert_eq!(classify(&stmt), SqlClassification::Read);
    }
}
