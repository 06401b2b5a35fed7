//! SQL dialect trait for multi-database support
//!
//! This trait defines the pieces of SQL syntax that differ between the
//! backends a compiled plan can be rendered for.

use crate::utils::sql::quote_identifier;

/// SQL dialect trait for generating database-specific SQL
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Generate a parameter placeholder for the given index (1-based)
    ///
    /// - SQLite: Always returns "?"
    /// - PostgreSQL: Returns "$1", "$2", etc.
    fn placeholder(&self, index: usize) -> String;

    /// Quote a table, alias or column identifier
    fn quote(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    /// Pattern match of `col` against the bound pattern `param`
    ///
    /// Patterns use `\` as escape character on every backend.
    fn like(&self, col: &str, param: &str, case_insensitive: bool) -> String;

    /// GLOB rewrite of a case-sensitive pattern, for backends whose LIKE
    /// folds case. Rendered as `col GLOB param` when present.
    fn case_sensitive_glob(&self, _pattern: &str) -> Option<String> {
        None
    }

    /// Expression a temporal column or operand is compared and ordered by
    fn temporal(&self, expr: &str) -> String {
        expr.to_string()
    }

    /// NULL placement suffix for ORDER BY; NULL sorts below every value
    fn nulls_order(&self, _descending: bool) -> &'static str {
        ""
    }

    /// Generate LIMIT/OFFSET clause, empty when neither applies
    fn limit_offset(&self, limit: Option<u64>, offset: u64) -> String {
        match (limit, offset) {
            (Some(limit), 0) => format!("LIMIT {}", limit),
            (Some(limit), offset) => format!("LIMIT {} OFFSET {}", limit, offset),
            (None, 0) => String::new(),
            (None, offset) => format!("OFFSET {}", offset),
        }
    }
}
