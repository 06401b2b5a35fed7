//! In-process evaluation of plans
//!
//! Follows SQL semantics where they matter for results: LEFT JOINs keep
//! unmatched parents, comparisons against NULL are unknown and unknown
//! filters a row out, NULL sorts first in ascending order.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::data::error::DataError;
use crate::query::aggregate::{AggregateColumn, AggregateFunc};
use crate::query::plan::OrderTerm;
use crate::query::predicate::{ColumnRef, CompareOp, Predicate, SqlValue};
use crate::query::relation::JoinSpec;
use crate::query::types::Row;
use crate::utils::sql::like_to_regex;
use crate::utils::time::{millis_to_datetime, parse_timestamp};

static NULL: Value = Value::Null;

/// One joined row: alias (or root table) to the row bound under it.
/// An alias missing from the map is a LEFT JOIN miss.
pub(super) type Tuple<'a> = HashMap<&'a str, &'a Row>;

pub(super) fn join<'a>(
    tables: &'a HashMap<String, Vec<Row>>,
    table: &'a str,
    joins: &'a [JoinSpec],
) -> Result<Vec<Tuple<'a>>, DataError> {
    let root = table_rows(tables, table)?;
    let mut tuples: Vec<Tuple<'a>> = root
        .iter()
        .map(|row| HashMap::from([(table, row)]))
        .collect();

    for spec in joins {
        let target = table_rows(tables, &spec.table)?;
        let mut next = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let local = tuple
                .get(spec.parent_alias.as_str())
                .and_then(|row| row.get(&spec.local_column))
                .filter(|v| !v.is_null());
            let matched: Vec<&Row> = match local {
                Some(local) => target
                    .iter()
                    .filter(|row| {
                        row.get(&spec.foreign_column)
                            .is_some_and(|v| order_values(v, local) == Ordering::Equal && !v.is_null())
                    })
                    .collect(),
                None => Vec::new(),
            };
            if matched.is_empty() {
                next.push(tuple);
                continue;
            }
            for row in matched {
                let mut joined = tuple.clone();
                joined.insert(spec.alias.as_str(), row);
                next.push(joined);
            }
        }
        tuples = next;
    }
    Ok(tuples)
}

fn table_rows<'a>(tables: &'a HashMap<String, Vec<Row>>, table: &str) -> Result<&'a [Row], DataError> {
    tables
        .get(table)
        .map(Vec::as_slice)
        .ok_or_else(|| DataError::UnknownTable(table.to_string()))
}

pub(super) fn lookup<'a>(tuple: &Tuple<'a>, column: &ColumnRef) -> &'a Value {
    let row = match &column.qualifier {
        Some(q) => tuple.get(q.as_str()).copied(),
        None => tuple.values().find(|row| row.contains_key(&column.name)).copied(),
    };
    row.and_then(|r| r.get(&column.name)).unwrap_or(&NULL)
}

/// Whether the predicate is definitely true for `tuple`
pub(super) fn matches(predicate: &Predicate, tuple: &Tuple<'_>) -> Result<bool, DataError> {
    Ok(eval(predicate, tuple)? == Some(true))
}

/// Three-valued evaluation; `None` is SQL's unknown
fn eval(predicate: &Predicate, tuple: &Tuple<'_>) -> Result<Option<bool>, DataError> {
    Ok(match predicate {
        Predicate::Compare { column, op, value } => {
            let actual = lookup(tuple, column);
            match (op, value) {
                (CompareOp::Eq, SqlValue::Null) => Some(actual.is_null()),
                (CompareOp::Neq, SqlValue::Null) => Some(!actual.is_null()),
                _ => compare_operand(actual, value).map(|ord| match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Neq => ord != Ordering::Equal,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                }),
            }
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
        } => {
            let Value::String(actual) = lookup(tuple, column) else {
                return Ok(None);
            };
            let re = like_to_regex(pattern, *case_insensitive)
                .map_err(|e| DataError::Unsupported(format!("pattern {}: {}", pattern, e)))?;
            Some(re.is_match(actual))
        }
        Predicate::In { column, values } => {
            let actual = lookup(tuple, column);
            if values.is_empty() {
                Some(false)
            } else if actual.is_null() {
                None
            } else {
                Some(
                    values
                        .iter()
                        .any(|v| compare_operand(actual, v) == Some(Ordering::Equal)),
                )
            }
        }
        Predicate::Not(inner) => eval(inner, tuple)?.map(|b| !b),
        Predicate::And(parts) => {
            let mut result = Some(true);
            for part in parts {
                match eval(part, tuple)? {
                    Some(false) => return Ok(Some(false)),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Predicate::Or(parts) => {
            let mut result = Some(false);
            for part in parts {
                match eval(part, tuple)? {
                    Some(true) => return Ok(Some(true)),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
    })
}

/// Compare a stored value with a bound operand; `None` when either is NULL
/// or the two cannot be compared
fn compare_operand(actual: &Value, operand: &SqlValue) -> Option<Ordering> {
    match (actual, operand) {
        (Value::Null, _) | (_, SqlValue::Null) => None,
        (_, SqlValue::Timestamp(ts)) => Some(instant(actual)?.cmp(ts)),
        (Value::String(a), SqlValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
        (actual, operand) => {
            let a = numeric(actual)?;
            let b = match operand {
                SqlValue::Int(i) => Numeric::Int(*i),
                SqlValue::Float(f) => Numeric::Float(*f),
                SqlValue::Bool(b) => Numeric::Int(i64::from(*b)),
                _ => return None,
            };
            a.partial_cmp(&b)
        }
    }
}

/// Stored temporal value as an instant: RFC 3339 text or epoch millis
fn instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => millis_to_datetime(n.as_i64()?),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Numeric::Int)
            .or_else(|| n.as_f64().map(Numeric::Float)),
        Value::Bool(b) => Some(Numeric::Int(i64::from(*b))),
        _ => None,
    }
}

/// Total order over stored values: NULL, booleans, numbers, strings
pub(super) fn order_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => numeric(a)
            .zip(numeric(b))
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

pub(super) fn sort_tuples(tuples: &mut [Tuple<'_>], order: &[OrderTerm]) {
    if order.is_empty() {
        return;
    }
    tuples.sort_by(|x, y| {
        order
            .iter()
            .map(|term| {
                let (a, b) = (lookup(x, &term.column), lookup(y, &term.column));
                let ord = if term.temporal {
                    order_instants(a, b)
                } else {
                    order_values(a, b)
                };
                if term.descending { ord.reverse() } else { ord }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Temporal order by instant, whatever the stored shape
fn order_instants(a: &Value, b: &Value) -> Ordering {
    match (instant(a), instant(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => order_values(a, b),
    }
}

/// Drop repeated rows, keeping the first occurrence
pub(super) fn dedup_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(Value::Object(row.clone()).to_string()))
        .collect()
}

/// Group filtered tuples and compute one output row per group
pub(super) fn aggregate(tuples: &[Tuple<'_>], columns: &[AggregateColumn]) -> Vec<Row> {
    let group_columns: Vec<&AggregateColumn> = columns.iter().filter(|c| c.is_group()).collect();

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Tuple<'_>>> = HashMap::new();
    for tuple in tuples {
        let key: Vec<&Value> = group_columns.iter().map(|c| lookup(tuple, &c.column)).collect();
        let key = serde_json::to_string(&key).unwrap_or_default();
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(tuple);
    }

    // Without GROUP BY an empty input still yields one row
    if group_columns.is_empty() && order.is_empty() {
        order.push(String::new());
        groups.insert(String::new(), Vec::new());
    }

    order
        .iter()
        .filter_map(|key| groups.get(key))
        .map(|members| {
            columns
                .iter()
                .map(|c| {
                    let values: Vec<&Value> = members.iter().map(|t| lookup(t, &c.column)).collect();
                    (c.alias.clone(), fold(c.func, &values))
                })
                .collect()
        })
        .collect()
}

fn fold(func: AggregateFunc, values: &[&Value]) -> Value {
    let present = values.iter().copied().filter(|v| !v.is_null());
    match func {
        AggregateFunc::GroupBy => values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        AggregateFunc::Count => Value::from(present.count() as u64),
        AggregateFunc::Max => present
            .max_by(|a, b| order_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunc::Min => present
            .min_by(|a, b| order_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunc::Sum => {
            let nums: Vec<Numeric> = present.filter_map(numeric).collect();
            if nums.is_empty() {
                return Value::Null;
            }
            if nums.iter().all(|n| matches!(n, Numeric::Int(_))) {
                let total = nums.iter().fold(0i64, |acc, n| match n {
                    Numeric::Int(i) => acc.saturating_add(*i),
                    Numeric::Float(_) => acc,
                });
                Value::from(total)
            } else {
                float_value(nums.iter().map(|n| n.as_f64()).sum())
            }
        }
        AggregateFunc::Avg => {
            let nums: Vec<f64> = present.filter_map(numeric).map(Numeric::as_f64).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                float_value(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new("t", name)
    }

    #[test]
    fn test_null_comparisons_are_unknown() {
        let r = row(json!({"a": null, "b": 3}));
        let tuple: Tuple<'_> = HashMap::from([("t", &r)]);
        let gt = Predicate::compare(col("a"), CompareOp::Gt, SqlValue::Int(1));
        assert_eq!(eval(&gt, &tuple).unwrap(), None);
        assert_eq!(eval(&gt.clone().negate(), &tuple).unwrap(), None);
        let is_null = Predicate::compare(col("a"), CompareOp::Eq, SqlValue::Null);
        assert!(matches(&is_null, &tuple).unwrap());
        let or = Predicate::Or(vec![gt, Predicate::compare(col("b"), CompareOp::Eq, SqlValue::Int(3))]);
        assert!(matches(&or, &tuple).unwrap());
    }

    #[test]
    fn test_numeric_and_timestamp_comparisons() {
        let r = row(json!({"n": 2.5, "i": 7, "ts": "2024-05-01T00:00:00Z"}));
        let tuple: Tuple<'_> = HashMap::from([("t", &r)]);
        assert!(matches(&Predicate::compare(col("n"), CompareOp::Gt, SqlValue::Int(2)), &tuple).unwrap());
        assert!(matches(&Predicate::compare(col("i"), CompareOp::Eq, SqlValue::Float(7.0)), &tuple).unwrap());
        let ts = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert!(
            matches(&Predicate::compare(col("ts"), CompareOp::Gte, SqlValue::Timestamp(ts)), &tuple)
                .unwrap()
        );
    }

    #[test]
    fn test_in_and_like() {
        let r = row(json!({"name": "Alice"}));
        let tuple: Tuple<'_> = HashMap::from([("t", &r)]);
        let within = Predicate::In {
            column: col("name"),
            values: vec![SqlValue::Text("Bob".into()), SqlValue::Text("Alice".into())],
        };
        assert!(matches(&within, &tuple).unwrap());
        let empty = Predicate::In {
            column: col("name"),
            values: vec![],
        };
        assert!(!matches(&empty, &tuple).unwrap());
        assert!(matches(&empty.negate(), &tuple).unwrap());

        let like = Predicate::Like {
            column: col("name"),
            pattern: "al%".into(),
            case_insensitive: true,
        };
        assert!(matches(&like, &tuple).unwrap());
    }

    #[test]
    fn test_order_values_nulls_first() {
        let mut values = vec![json!("b"), json!(null), json!(2), json!(1.5), json!("a")];
        values.sort_by(order_values);
        assert_eq!(values, vec![json!(null), json!(1.5), json!(2), json!("a"), json!("b")]);
    }

    #[test]
    fn test_temporal_terms_order_by_instant() {
        let rows: Vec<Row> = [
            json!({"id": 1, "ts": "2024-01-01T00:00:00.500Z"}),
            json!({"id": 2, "ts": "2024-01-01T00:00:00Z"}),
            json!({"id": 3, "ts": null}),
            json!({"id": 4, "ts": 1_704_067_199_000_i64}),
        ]
        .into_iter()
        .map(row)
        .collect();
        let mut tuples: Vec<Tuple<'_>> = rows.iter().map(|r| HashMap::from([("t", r)])).collect();
        let term = OrderTerm {
            column: col("ts"),
            descending: false,
            temporal: true,
        };
        sort_tuples(&mut tuples, std::slice::from_ref(&term));
        let ids: Vec<&Value> = tuples.iter().map(|t| lookup(t, &col("id"))).collect();
        assert_eq!(ids, vec![&json!(3), &json!(4), &json!(2), &json!(1)]);

        // Text order puts "..00.500Z" before "..00Z"
        let text = OrderTerm { temporal: false, ..term };
        sort_tuples(&mut tuples, &[text]);
        assert_eq!(lookup(&tuples[2], &col("id")), &json!(1));
    }

    #[test]
    fn test_left_join_keeps_unmatched_parents() {
        let tables = HashMap::from([
            (
                "users".to_string(),
                vec![row(json!({"id": 1, "org_id": 10})), row(json!({"id": 2, "org_id": null}))],
            ),
            ("orgs".to_string(), vec![row(json!({"id": 10, "name": "acme"}))]),
        ]);
        let joins = vec![JoinSpec {
            relation: "organization".into(),
            alias: "organization".into(),
            parent_alias: "users".into(),
            table: "orgs".into(),
            local_column: "org_id".into(),
            foreign_column: "id".into(),
            kind: crate::query::metadata::RelationKind::BelongsTo,
        }];
        let tuples = join(&tables, "users", &joins).unwrap();
        assert_eq!(tuples.len(), 2);
        let name = ColumnRef::new("organization", "name");
        assert_eq!(lookup(&tuples[0], &name), &json!("acme"));
        assert_eq!(lookup(&tuples[1], &name), &Value::Null);
    }

    #[test]
    fn test_aggregate_fold() {
        let values = [json!(1), json!(null), json!(4)];
        let refs: Vec<&Value> = values.iter().collect();
        assert_eq!(fold(AggregateFunc::Count, &refs), json!(2));
        assert_eq!(fold(AggregateFunc::Sum, &refs), json!(5));
        assert_eq!(fold(AggregateFunc::Avg, &refs), json!(2.5));
        assert_eq!(fold(AggregateFunc::Max, &refs), json!(4));
        assert_eq!(fold(AggregateFunc::Min, &refs), json!(1));
        assert_eq!(fold(AggregateFunc::Avg, &[]), Value::Null);
    }
}
