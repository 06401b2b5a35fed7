//! SQLite SQL dialect implementation

use super::SqlDialect;
use crate::utils::sql::like_to_glob;

/// SQLite SQL dialect
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn like(&self, col: &str, param: &str, case_insensitive: bool) -> String {
        // No ILIKE; LOWER() also folds the non-ASCII case LIKE leaves alone
        if case_insensitive {
            format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\'", col, param)
        } else {
            format!("{} LIKE {} ESCAPE '\\'", col, param)
        }
    }

    fn case_sensitive_glob(&self, pattern: &str) -> Option<String> {
        Some(like_to_glob(pattern))
    }

    /// Timestamps are stored as text in varying RFC 3339 shapes
    fn temporal(&self, expr: &str) -> String {
        format!("julianday({})", expr)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: u64) -> String {
        // OFFSET is only valid after a LIMIT clause
        match (limit, offset) {
            (None, 0) => String::new(),
            (None, offset) => format!("LIMIT -1 OFFSET {}", offset),
            (Some(limit), 0) => format!("LIMIT {}", limit),
            (Some(limit), offset) => format!("LIMIT {} OFFSET {}", limit, offset),
        }
    }
}
