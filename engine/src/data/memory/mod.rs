//! In-memory store
//!
//! Holds named tables of JSON rows keyed by column name and evaluates plans
//! in process. Used by tests and by the CLI when no database is configured.

mod eval;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::traits::QueryStore;
use crate::query::plan::{AggregatePlan, CountPlan, SelectPlan};
use crate::query::types::Row;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    pub fn insert(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Parse `{"table": [{row}, ...], ...}`
    pub fn from_json_str(json: &str) -> Result<Self, DataError> {
        let tables: HashMap<String, Vec<Row>> =
            serde_json::from_str(json).map_err(|e| DataError::Decode(e.to_string()))?;
        Ok(Self { tables })
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path)?;
        let store = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), tables = store.tables.len(), "Loaded memory store");
        Ok(store)
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }
}

#[async_trait]
impl QueryStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_rows(&self, plan: &SelectPlan) -> Result<Vec<Row>, DataError> {
        let mut tuples = Vec::new();
        for tuple in eval::join(&self.tables, &plan.table, &plan.joins)? {
            if let Some(filter) = &plan.filter
                && !eval::matches(filter, &tuple)?
            {
                continue;
            }
            tuples.push(tuple);
        }
        eval::sort_tuples(&mut tuples, &plan.order);

        let mut rows: Vec<Row> = tuples
            .iter()
            .map(|tuple| {
                plan.columns
                    .iter()
                    .map(|p| (p.alias.clone(), eval::lookup(tuple, &p.column).clone()))
                    .collect()
            })
            .collect();
        if plan.distinct {
            rows = eval::dedup_rows(rows);
        }

        let offset = usize::try_from(plan.offset).unwrap_or(usize::MAX);
        let limit = plan
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_rows(&self, plan: &CountPlan) -> Result<u64, DataError> {
        let mut keys = std::collections::HashSet::new();
        let mut count = 0u64;
        for tuple in eval::join(&self.tables, &plan.table, &plan.joins)? {
            if let Some(filter) = &plan.filter
                && !eval::matches(filter, &tuple)?
            {
                continue;
            }
            if plan.distinct {
                let key: Vec<&serde_json::Value> = plan
                    .key_columns
                    .iter()
                    .map(|c| eval::lookup(&tuple, c))
                    .collect();
                if !keys.insert(serde_json::to_string(&key).unwrap_or_default()) {
                    continue;
                }
            }
            count += 1;
        }
        Ok(count)
    }

    async fn fetch_aggregates(&self, plan: &AggregatePlan) -> Result<Vec<Row>, DataError> {
        let mut tuples = Vec::new();
        for tuple in eval::join(&self.tables, &plan.table, &plan.joins)? {
            if let Some(filter) = &plan.filter
                && !eval::matches(filter, &tuple)?
            {
                continue;
            }
            tuples.push(tuple);
        }
        Ok(eval::aggregate(&tuples, &plan.columns))
    }
}
