//! Error types for plan execution
//!
//! `DataError` covers the stores; `RepositoryError` is what callers of the
//! entity repository see, wrapping either a compile failure or a store failure.

use thiserror::Error;

use crate::query::QueryError;

#[derive(Error, Debug)]
pub enum DataError {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    /// Row lookup matched nothing
    #[error("Not found")]
    NotFound,

    /// Table referenced by a plan is not known to the store
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Plan uses something the store cannot execute
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A stored value could not be converted to a row value
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Create a SQLite error, mapping an empty fetch to `NotFound`
    pub fn from_sqlite(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound,
            e => Self::Sqlite(e),
        }
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Data(#[from] DataError),
}
