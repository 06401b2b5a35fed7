//! SQLite store
//!
//! Renders plans through `SqliteDialect`, binds operands positionally and
//! decodes result rows into JSON objects keyed by projection alias.
//! Timestamps are expected as RFC 3339 text and bound the same way.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Decode, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

use crate::data::error::DataError;
use crate::data::sql::{RenderedQuery, SqliteDialect, render_aggregate, render_count, render_select};
use crate::data::traits::QueryStore;
use crate::query::plan::{AggregatePlan, CountPlan, SelectPlan};
use crate::query::predicate::{SqlValue, format_timestamp};
use crate::query::types::Row;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a pool for `url` (`sqlite://path.db`, `sqlite::memory:`)
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DataError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(DataError::from_sqlite)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(DataError::from_sqlite)?;
        tracing::debug!(%url, max_connections, "SqliteStore connected");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }

    async fn fetch(&self, rendered: &RenderedQuery) -> Result<Vec<Row>, DataError> {
        let query = rendered
            .params
            .iter()
            .fold(sqlx::query(&rendered.sql), bind_value);
        let rows = query.fetch_all(&self.pool).await.map_err(DataError::from_sqlite)?;
        tracing::trace!(sql = %rendered.sql, rows = rows.len(), "SQLite query executed");
        rows.iter().map(decode_row).collect()
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Timestamp(ts) => query.bind(format_timestamp(ts)),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, DataError> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(DataError::from_sqlite)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_info = raw.type_info().into_owned();
            match type_info.name() {
                "INTEGER" => <i64 as Decode<Sqlite>>::decode(raw).map(Value::from),
                "REAL" => <f64 as Decode<Sqlite>>::decode(raw).map(|f| {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }),
                "BLOB" => <Vec<u8> as Decode<Sqlite>>::decode(raw)
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
                _ => <String as Decode<Sqlite>>::decode(raw).map(Value::String),
            }
            .map_err(|e| DataError::Decode(format!("column {}: {}", column.name(), e)))?
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl QueryStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_rows(&self, plan: &SelectPlan) -> Result<Vec<Row>, DataError> {
        self.fetch(&render_select(&SqliteDialect, plan)).await
    }

    async fn count_rows(&self, plan: &CountPlan) -> Result<u64, DataError> {
        let rows = self.fetch(&render_count(&SqliteDialect, plan)).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| DataError::Decode("count query returned no count".to_string()))
    }

    async fn fetch_aggregates(&self, plan: &AggregatePlan) -> Result<Vec<Row>, DataError> {
        self.fetch(&render_aggregate(&SqliteDialect, plan)).await
    }
}
