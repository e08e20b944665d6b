//! Read-only statement guard.
//!
//! Generated SQL is parsed before it reaches the database. Only a single
//! query, `EXPLAIN` of a query, `DESCRIBE`, or a `SHOW TABLES` /
//! `SHOW COLUMNS` / `SHOW CREATE` statement is let through.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

/// Why a statement was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Generated statement is empty")]
    Empty,

    #[error("Generated statement does not parse: {0}")]
    Parse(String),

    #[error("Expected exactly one statement, found {0}")]
    StatementCount(usize),

    #[error("Refusing to run a non read-only statement: {0}")]
    NotReadOnly(String),
}

/// Accept `sql` only if it is exactly one read-only statement.
pub fn check_read_only(sql: &str) -> Result<(), GuardError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(GuardError::Empty);
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, trimmed)
        .map_err(|e| GuardError::Parse(e.to_string()))?;

    match statements.as_slice() {
        [statement] if is_read_only(statement) => Ok(()),
        [statement] => Err(GuardError::NotReadOnly(leading_keyword(statement))),
        other => Err(GuardError::StatementCount(other.len())),
    }
}

fn is_read_only(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => query_is_read_only(query),
        Statement::Explain { statement, .. } => match statement.as_ref() {
            Statement::Query(query) => query_is_read_only(query),
            _ => false,
        },
        Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. } => true,
        _ => false,
    }
}

/// `SELECT ... FOR UPDATE` takes write locks and `SELECT ... INTO` writes.
fn query_is_read_only(query: &Query) -> bool {
    query.locks.is_empty() && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        SetExpr::Values(_) => true,
        _ => false,
    }
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}
