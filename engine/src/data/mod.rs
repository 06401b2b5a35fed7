//! Plan execution
//!
//! `QueryStore` is the seam between compiled plans and storage. Two stores
//! are provided: an in-memory evaluator and SQLite over sqlx. The Postgres
//! dialect renders SQL only.

pub mod error;
pub mod memory;
pub mod repository;
pub mod sql;
pub mod sqlite;
pub mod traits;

pub use error::{DataError, RepositoryError};
pub use memory::MemoryStore;
pub use repository::EntityRepository;
pub use sqlite::SqliteStore;
pub use traits::QueryStore;
