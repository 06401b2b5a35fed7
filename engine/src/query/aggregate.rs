//! Aggregate projection and response decoding
//!
//! Projections are aliased `GROUP_BY_<field>` and `<FUNC>_<field>`; result
//! rows are decoded back by matching the same grammar.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;
use super::metadata::EntityMetadata;
use super::predicate::ColumnRef;
use super::types::Row;

static AGGREGATE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(AVG|SUM|COUNT|MAX|MIN|GROUP_BY)_(.+)$").expect("Invalid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateFunc {
    GroupBy,
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunc {
    /// Alias prefix, also the SQL function name for non-grouping entries
    pub fn prefix(&self) -> &'static str {
        match self {
            AggregateFunc::GroupBy => "GROUP_BY",
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_uppercase().as_str() {
            "GROUP_BY" => Some(AggregateFunc::GroupBy),
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MAX" => Some(AggregateFunc::Max),
            "MIN" => Some(AggregateFunc::Min),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Group-by fields plus per-function field lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateQuery {
    pub group_by: Vec<String>,
    pub count: Vec<String>,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub max: Vec<String>,
    pub min: Vec<String>,
}

impl AggregateQuery {
    /// `(function, field)` pairs in projection order
    pub fn entries(&self) -> impl Iterator<Item = (AggregateFunc, &str)> {
        let lists = [
            (AggregateFunc::GroupBy, &self.group_by),
            (AggregateFunc::Count, &self.count),
            (AggregateFunc::Sum, &self.sum),
            (AggregateFunc::Avg, &self.avg),
            (AggregateFunc::Max, &self.max),
            (AggregateFunc::Min, &self.min),
        ];
        lists
            .into_iter()
            .flat_map(|(func, fields)| fields.iter().map(move |f| (func, f.as_str())))
    }
}

/// One projected aggregate expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateColumn {
    pub func: AggregateFunc,
    pub field: String,
    pub column: ColumnRef,
    pub alias: String,
}

impl AggregateColumn {
    pub fn is_group(&self) -> bool {
        self.func == AggregateFunc::GroupBy
    }
}

/// Build the aliased projection for `query`
///
/// Columns are qualified by `path` when given, otherwise by the entity table.
pub fn build_projection(
    query: &AggregateQuery,
    entity: &EntityMetadata,
    path: &str,
) -> Result<Vec<AggregateColumn>, QueryError> {
    let qualifier = if path.is_empty() { entity.table() } else { path };
    let columns = query
        .entries()
        .map(|(func, field)| {
            let meta = entity.require_field(field)?;
            Ok(AggregateColumn {
                func,
                field: field.to_string(),
                column: ColumnRef::new(qualifier, meta.column()),
                alias: format!("{}_{}", func.prefix(), field),
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    if columns.is_empty() {
        return Err(QueryError::NoAggregateFields);
    }
    tracing::trace!(entity = %entity.name, columns = columns.len(), "Built aggregate projection");
    Ok(columns)
}

/// Decoded aggregate row, grouped by function
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResponse {
    entries: BTreeMap<AggregateFunc, BTreeMap<String, Value>>,
}

impl AggregateResponse {
    pub fn insert(&mut self, func: AggregateFunc, field: &str, value: Value) {
        self.entries
            .entry(func)
            .or_default()
            .insert(field.to_string(), value);
    }

    /// Look up a value; field names compare case-insensitively
    pub fn get(&self, func: AggregateFunc, field: &str) -> Option<&Value> {
        self.entries
            .get(&func)?
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode result rows, one response per row
pub fn decode_response(rows: &[Row]) -> Result<Vec<AggregateResponse>, QueryError> {
    rows.iter().map(decode_row).collect()
}

fn decode_row(row: &Row) -> Result<AggregateResponse, QueryError> {
    let mut response = AggregateResponse::default();
    for (column, value) in row {
        let captures = AGGREGATE_ALIAS
            .captures(column)
            .ok_or_else(|| QueryError::UnknownAggregateColumn(column.to_ascii_uppercase()))?;
        let func = AggregateFunc::from_prefix(&captures[1])
            .ok_or_else(|| QueryError::UnknownAggregateColumn(column.to_ascii_uppercase()))?;
        response.insert(func, &captures[2], value.clone());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::metadata::MetadataProvider;
    use crate::query::testing::registry;
    use serde_json::json;

    fn request() -> AggregateQuery {
        serde_json::from_value(json!({
            "groupBy": ["country"],
            "count": ["country"],
            "max": ["age"],
            "min": ["age"]
        }))
        .unwrap()
    }

    #[test]
    fn test_projection_aliases() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let columns = build_projection(&request(), user, "").unwrap();
        let aliases: Vec<&str> = columns.iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(
            aliases,
            vec!["GROUP_BY_country", "COUNT_country", "MAX_age", "MIN_age"]
        );
        assert_eq!(columns[0].column, ColumnRef::new("users", "country"));
        assert!(columns[0].is_group());
        assert!(!columns[1].is_group());
    }

    #[test]
    fn test_projection_order_and_path() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let query = AggregateQuery {
            min: vec!["age".into()],
            avg: vec!["age".into()],
            sum: vec!["age".into()],
            ..Default::default()
        };
        let columns = build_projection(&query, user, "u").unwrap();
        let funcs: Vec<AggregateFunc> = columns.iter().map(|c| c.func).collect();
        assert_eq!(
            funcs,
            vec![AggregateFunc::Sum, AggregateFunc::Avg, AggregateFunc::Min]
        );
        assert_eq!(columns[0].column, ColumnRef::new("u", "age"));
    }

    #[test]
    fn test_projection_errors() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        assert_eq!(
            build_projection(&AggregateQuery::default(), user, "").unwrap_err(),
            QueryError::NoAggregateFields
        );
        let query = AggregateQuery {
            count: vec!["shoe_size".into()],
            ..Default::default()
        };
        assert!(matches!(
            build_projection(&query, user, ""),
            Err(QueryError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_decode_uppercase_row() {
        let row = json!({
            "GROUP_BY_COUNTRY": "china",
            "COUNT_COUNTRY": 3,
            "MAX_AGE": 40,
            "MIN_AGE": 18
        });
        let responses = decode_response(&[row.as_object().unwrap().clone()]).unwrap();
        assert_eq!(responses.len(), 1);
        let r = &responses[0];
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(AggregateFunc::GroupBy, "country"), Some(&json!("china")));
        assert_eq!(r.get(AggregateFunc::Count, "country"), Some(&json!(3)));
        assert_eq!(r.get(AggregateFunc::Max, "age"), Some(&json!(40)));
        assert_eq!(r.get(AggregateFunc::Min, "age"), Some(&json!(18)));
        assert_eq!(r.get(AggregateFunc::Avg, "age"), None);
    }

    #[test]
    fn test_decode_preserves_field_case_and_serializes_grouped() {
        let row = json!({"GROUP_BY_country": "fr", "avg_age": 31.5});
        let responses = decode_response(&[row.as_object().unwrap().clone()]).unwrap();
        assert_eq!(
            serde_json::to_value(&responses[0]).unwrap(),
            json!({"groupBy": {"country": "fr"}, "avg": {"age": 31.5}})
        );
    }

    #[test]
    fn test_decode_multiple_rows_independently() {
        let rows: Vec<Row> = vec![
            json!({"GROUP_BY_country": "a", "COUNT_id": 1}),
            json!({"GROUP_BY_country": "b", "COUNT_id": 2}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        let responses = decode_response(&rows).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].get(AggregateFunc::Count, "id"), Some(&json!(2)));
    }

    #[test]
    fn test_decode_unknown_column() {
        let row = json!({"total": 3});
        let err = decode_response(&[row.as_object().unwrap().clone()]).unwrap_err();
        assert_eq!(err.to_string(), "unknown aggregate column encountered for TOTAL");
        let row = json!({"COUNT_": 3});
        assert!(decode_response(&[row.as_object().unwrap().clone()]).is_err());
    }
}
