//! SQL abstraction layer for multi-database support
//!
//! Plans are rendered once per dialect; the SQLite store executes them and
//! the Postgres dialect backs `sift compile --dialect postgres`.

mod dialect;
mod postgres_dialect;
mod render;
mod sqlite_dialect;

pub use dialect::SqlDialect;
pub use postgres_dialect::PostgresDialect;
pub use render::{RenderedQuery, render_aggregate, render_count, render_select};
pub use sqlite_dialect::SqliteDialect;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Database backend identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl Backend {
    /// Get the SQL dialect for this backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Backend::Sqlite => &SqliteDialect,
            Backend::Postgres => &PostgresDialect,
        }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(format!("unknown SQL dialect '{}'", other)),
        }
    }
}
