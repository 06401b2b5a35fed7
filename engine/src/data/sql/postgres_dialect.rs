//! PostgreSQL SQL dialect implementation

use super::SqlDialect;

/// PostgreSQL SQL dialect
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn like(&self, col: &str, param: &str, case_insensitive: bool) -> String {
        let op = if case_insensitive { "ILIKE" } else { "LIKE" };
        format!("{} {} {}", col, op, param)
    }

    /// Postgres sorts NULL above every value by default
    fn nulls_order(&self, descending: bool) -> &'static str {
        if descending { " NULLS LAST" } else { " NULLS FIRST" }
    }
}
