//! Read-only check for the audit query.
//!
//! The audit query runs against every target with the shared credentials, so
//! it is parsed once at startup and rejected unless it is a single statement
//! that cannot modify data.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{AuditError, Result};

/// Fails unless `sql` is exactly one read-only query.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| AuditError::config(format!("Audit query does not parse: {e}")))?;

    match statements.as_slice() {
        [] => Err(AuditError::config("Audit query is empty")),
        [Statement::Query(query)] if is_read_only_query(query) => Ok(()),
        [_] => Err(AuditError::config(
            "Audit query must be a read-only SELECT statement",
        )),
        _ => Err(AuditError::config(format!(
            "Audit query must be a single statement, found {}",
            statements.len()
        ))),
    }
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query.with.as_ref().map_or(true, |with| {
        with.cte_tables
            .iter()
            .all(|cte| is_read_only_query(&cte.query))
    });

    ctes_read_only && query.locks.is_empty() && is_read_only_set_expr(&query.body)
}

fn is_read_only_set_expr(expr: &SetExpr) -> bool {
    match expr {
        // SELECT ... INTO creates a table
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_set_expr(left) && is_read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}
