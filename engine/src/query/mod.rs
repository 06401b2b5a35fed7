//! Filter, sort, cursor and aggregate compilation
//!
//! Everything in here is pure: requests plus entity metadata go in, plans
//! come out. Executing plans is the job of `crate::data`.

pub mod aggregate;
pub mod builder;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod keyset;
pub mod metadata;
pub mod plan;
pub mod predicate;
pub mod relation;
pub mod sort;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{AggregateFunc, AggregateQuery, AggregateResponse};
pub use builder::{QueryBuilder, QueryLimits};
pub use error::{ErrorKind, QueryError};
pub use filter::FilterNode;
pub use keyset::Direction;
pub use metadata::{EntityMetadata, MetadataProvider, MetadataRegistry};
pub use plan::{AggregatePlan, CountPlan, CursorPlan, SelectPlan};
pub use types::{CursorPage, CursorQuery, PageInfo, PageQuery, Pagination, Row};
