//! Keyset pagination
//!
//! Builds the lexicographic tie-break predicate selecting rows strictly after
//! (forward) or before (backward) a cursor position, and derives cursors from
//! boundary rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::cursor::{self, CursorValue};
use super::error::QueryError;
use super::metadata::DataType;
use super::predicate::{CompareOp, Predicate, SqlValue};
use super::sort::SortKey;
use super::types::Row;
use crate::utils::time::{millis_to_datetime, parse_timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "after", alias = "next")]
    Forward,
    #[serde(alias = "before", alias = "prev")]
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Predicate selecting rows past the cursor; `None` for the first page
///
/// Position `i` contributes `k0 = v0 AND .. AND k(i-1) = v(i-1) AND ki > vi`,
/// where `>` becomes `<` when walking forward over a descending key or
/// backward over an ascending one. NULL orders below every value, so
/// equality on a NULL cursor value is `IS NULL`, `> NULL` is `IS NOT NULL`,
/// `< v` also admits NULL and nothing is below NULL.
pub fn build_cursor_predicate(
    keys: &[SortKey],
    values: &[CursorValue],
    direction: Direction,
) -> Result<Option<Predicate>, QueryError> {
    if values.is_empty() {
        return Ok(None);
    }
    if values.len() != keys.len() {
        return Err(QueryError::CursorLengthMismatch {
            cursor: values.len(),
            sort: keys.len(),
        });
    }

    let operands = keys
        .iter()
        .zip(values)
        .map(|(key, value)| normalize(key, value))
        .collect::<Result<Vec<_>, _>>()?;

    let mut branches = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let after = matches!(
            (direction, key.descending),
            (Direction::Forward, false) | (Direction::Backward, true)
        );
        let Some(step) = step_past(key, &operands[i], after) else {
            continue;
        };
        let mut parts: Vec<Predicate> = keys[..i]
            .iter()
            .zip(&operands[..i])
            .map(|(prev, value)| Predicate::compare(prev.column.clone(), CompareOp::Eq, value.clone()))
            .collect();
        parts.push(step);
        branches.push(Predicate::and(parts));
    }

    tracing::trace!(keys = keys.len(), %direction, "Built keyset predicate");
    Ok(Some(Predicate::or(branches)))
}

/// Rows strictly above (`after`) or below `value` on one key
fn step_past(key: &SortKey, value: &SqlValue, after: bool) -> Option<Predicate> {
    let column = key.column.clone();
    match (value, after) {
        (SqlValue::Null, true) => Some(Predicate::compare(column, CompareOp::Neq, SqlValue::Null)),
        (SqlValue::Null, false) => None,
        (value, true) => Some(Predicate::compare(column, CompareOp::Gt, value.clone())),
        (value, false) => Some(Predicate::Or(vec![
            Predicate::compare(column.clone(), CompareOp::Lt, value.clone()),
            Predicate::compare(column, CompareOp::Eq, SqlValue::Null),
        ])),
    }
}

/// Bring a cursor value into the comparable form for its key
fn normalize(key: &SortKey, value: &CursorValue) -> Result<SqlValue, QueryError> {
    if matches!(value, CursorValue::Null) {
        return Ok(SqlValue::Null);
    }
    if key.data_type == DataType::Timestamp {
        let ts = match value {
            CursorValue::Timestamp(ts) => Some(*ts),
            CursorValue::Int(millis) => millis_to_datetime(*millis),
            CursorValue::String(s) => parse_timestamp(s),
            _ => None,
        };
        return ts
            .map(SqlValue::Timestamp)
            .ok_or_else(|| QueryError::unsupported_temporal(&key.field, format!("{:?}", value)));
    }

    Ok(match value {
        CursorValue::Null => SqlValue::Null,
        CursorValue::String(s) => SqlValue::Text(s.clone()),
        CursorValue::Int(i) => SqlValue::Int(*i),
        CursorValue::Float(f) => SqlValue::Float(*f),
        CursorValue::Bool(b) => SqlValue::Bool(*b),
        CursorValue::Timestamp(ts) => SqlValue::Timestamp(*ts),
    })
}

/// Encode the sort-key values of `row` as a cursor token
pub fn cursor_for_row(keys: &[SortKey], row: &Row) -> Result<String, QueryError> {
    let values = keys
        .iter()
        .map(|key| {
            let value = row.get(&key.field).unwrap_or(&serde_json::Value::Null);
            CursorValue::from_row_value(&key.field, value, key.data_type)
        })
        .collect::<Result<Vec<_>, _>>()?;
    cursor::encode(&values)
}

/// Trim a `limit + 1` fetch to `limit` rows; true when the extra row was present
pub fn trim_lookahead(rows: &mut Vec<Row>, limit: usize) -> bool {
    if rows.len() > limit {
        rows.truncate(limit);
        true
    } else {
        false
    }
}
