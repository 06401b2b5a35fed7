//! Entity repository
//!
//! The top-level read operations for one entity: compile a request against
//! the metadata, hand the plan to a store, post-process the rows.

use std::sync::Arc;

use serde_json::Value;

use crate::data::error::{DataError, RepositoryError};
use crate::data::traits::QueryStore;
use crate::query::aggregate::{AggregateQuery, AggregateResponse, decode_response};
use crate::query::builder::{QueryBuilder, QueryLimits};
use crate::query::filter::FilterNode;
use crate::query::keyset::{Direction, cursor_for_row, trim_lookahead};
use crate::query::metadata::MetadataProvider;
use crate::query::types::{CursorPage, CursorQuery, PageInfo, PageQuery, Pagination, Row};

pub struct EntityRepository<S: QueryStore + ?Sized, P: MetadataProvider + ?Sized> {
    store: Arc<S>,
    provider: Arc<P>,
    entity: String,
    limits: QueryLimits,
}

impl<S: QueryStore + ?Sized, P: MetadataProvider + ?Sized> EntityRepository<S, P> {
    /// Fails when `entity` is not declared by `provider`
    pub fn new(store: Arc<S>, provider: Arc<P>, entity: &str) -> Result<Self, RepositoryError> {
        provider.require(entity)?;
        Ok(Self {
            store,
            provider,
            entity: entity.to_string(),
            limits: QueryLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn builder(&self) -> QueryBuilder<'_, P> {
        QueryBuilder::new(self.provider.as_ref()).with_limits(self.limits)
    }

    /// Plain page query
    pub async fn query(&self, query: &PageQuery) -> Result<Vec<Row>, RepositoryError> {
        let plan = self.builder().build_page_query(&self.entity, query)?;
        let rows = self.store.fetch_rows(&plan).await?;
        tracing::debug!(entity = %self.entity, store = self.store.name(), rows = rows.len(), "Page query");
        Ok(rows)
    }

    /// Number of rows matching `filter`
    pub async fn count(&self, filter: &FilterNode) -> Result<u64, RepositoryError> {
        let plan = self.builder().build_count_query(&self.entity, filter)?;
        Ok(self.store.count_rows(&plan).await?)
    }

    /// First row matching `filter`, if any
    pub async fn query_one(&self, filter: &FilterNode) -> Result<Option<Row>, RepositoryError> {
        let query = PageQuery {
            filter: filter.clone(),
            sort: Vec::new(),
            pagination: Pagination::limit_offset(1, 0),
        };
        let plan = self.builder().build_page_query(&self.entity, &query)?;
        let rows = absent_as_empty(self.store.fetch_rows(&plan).await)?;
        Ok(rows.into_iter().next())
    }

    /// Row by primary key; a composite key is passed as `{field: value}`
    pub async fn get(&self, id: &Value) -> Result<Option<Row>, RepositoryError> {
        let plan = self.builder().build_lookup(&self.entity, id)?;
        let rows = absent_as_empty(self.store.fetch_rows(&plan).await)?;
        if rows.is_empty() {
            tracing::debug!(entity = %self.entity, %id, "Row not found");
        }
        Ok(rows.into_iter().next())
    }

    /// Keyset page with start/end cursors
    pub async fn cursor_query(&self, query: &CursorQuery) -> Result<CursorPage, RepositoryError> {
        let plan = self.builder().build_cursor_query(&self.entity, query)?;
        let mut rows = self.store.fetch_rows(&plan.select).await?;

        let limit = usize::try_from(plan.limit).unwrap_or(usize::MAX);
        let has_more = trim_lookahead(&mut rows, limit);
        if plan.direction == Direction::Backward {
            rows.reverse();
        }

        let start_cursor = rows
            .first()
            .map(|row| cursor_for_row(&plan.keys, row))
            .transpose()?;
        let end_cursor = rows
            .last()
            .map(|row| cursor_for_row(&plan.keys, row))
            .transpose()?;

        let helpers: Vec<&str> = plan.helper_keys().collect();
        if !helpers.is_empty() {
            for row in &mut rows {
                row.retain(|key, _| !helpers.contains(&key.as_str()));
            }
        }

        tracing::debug!(
            entity = %self.entity,
            store = self.store.name(),
            direction = %plan.direction,
            rows = rows.len(),
            has_more,
            "Cursor query"
        );
        Ok(CursorPage {
            rows,
            page_info: PageInfo {
                start_cursor,
                end_cursor,
                has_next: has_more,
                has_previous: has_more,
            },
        })
    }

    /// Grouped aggregates, one decoded response per result row
    pub async fn aggregate(
        &self,
        filter: &FilterNode,
        aggregate: &AggregateQuery,
    ) -> Result<Vec<AggregateResponse>, RepositoryError> {
        let plan = self
            .builder()
            .build_aggregate_query(&self.entity, filter, aggregate)?;
        let rows = self.store.fetch_aggregates(&plan).await?;
        Ok(decode_response(&rows)?)
    }
}

/// A store reporting "not found" for a lookup means an empty result
fn absent_as_empty(result: Result<Vec<Row>, DataError>) -> Result<Vec<Row>, DataError> {
    match result {
        Err(DataError::NotFound) => Ok(Vec::new()),
        other => other,
    }
}
