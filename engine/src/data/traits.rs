//! Store trait executing compiled plans
//!
//! A store knows nothing about entities, filters or cursors. It receives
//! fully resolved plans and returns rows keyed by projection alias.

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::query::plan::{AggregatePlan, CountPlan, SelectPlan};
use crate::query::types::Row;

#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &'static str;

    /// Run a select plan, honoring its order, window and distinct flag
    async fn fetch_rows(&self, plan: &SelectPlan) -> Result<Vec<Row>, DataError>;

    /// Count root rows matching a count plan
    async fn count_rows(&self, plan: &CountPlan) -> Result<u64, DataError>;

    /// Run an aggregate plan; row keys are the projection aliases
    async fn fetch_aggregates(&self, plan: &AggregatePlan) -> Result<Vec<Row>, DataError>;
}
