//! Filter parsing
//!
//! Validates the DSL shape once: `{"and": [...]}`, `{"or": [...]}` and
//! `{field: {operator: value}}` / `{relation: {...nested filter...}}`.

use serde_json::{Map, Value};

use super::comparison::Operator;
use super::types::{Comparison, FieldCondition, FieldFilter, FilterNode, GroupKind};
use crate::query::error::QueryError;

/// Maximum size of filter JSON in bytes (64KB)
const MAX_FILTER_JSON_SIZE: usize = 64 * 1024;

const AND_KEY: &str = "and";
const OR_KEY: &str = "or";

/// Parse a filter from a JSON string, enforcing the size limit
pub fn parse_filter_str(json_str: &str, max_depth: usize) -> Result<FilterNode, QueryError> {
    check_size(json_str.len())?;
    let value: Value =
        serde_json::from_str(json_str).map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
    parse_filter(&value, max_depth)
}

/// Parse a filter document. `null` is the empty filter.
///
/// Documents that arrive already decoded are measured by their compact
/// serialization, so the size limit holds on every entry point.
pub fn parse_filter(value: &Value, max_depth: usize) -> Result<FilterNode, QueryError> {
    match value {
        Value::Null => Ok(FilterNode::match_all()),
        Value::Object(map) => {
            let encoded =
                serde_json::to_vec(value).map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
            check_size(encoded.len())?;
            parse_object(map, 1, max_depth)
        }
        other => Err(QueryError::InvalidFilter(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn check_size(len: usize) -> Result<(), QueryError> {
    if len > MAX_FILTER_JSON_SIZE {
        return Err(QueryError::InvalidFilter(format!(
            "filter JSON exceeds maximum size of {} bytes",
            MAX_FILTER_JSON_SIZE
        )));
    }
    Ok(())
}

fn parse_object(
    map: &Map<String, Value>,
    depth: usize,
    max_depth: usize,
) -> Result<FilterNode, QueryError> {
    if depth > max_depth {
        return Err(QueryError::InvalidFilter(format!(
            "filter nesting exceeds {} levels",
            max_depth
        )));
    }

    let mut parts = Vec::with_capacity(map.len());

    if let Some(members) = map.get(AND_KEY) {
        let children = parse_members(AND_KEY, members, depth, max_depth)?;
        if !children.is_empty() {
            parts.push(FilterNode::Group {
                kind: GroupKind::And,
                children,
            });
        }
    }

    if let Some(members) = map.get(OR_KEY) {
        let children = parse_members(OR_KEY, members, depth, max_depth)?;
        if !children.is_empty() {
            parts.push(FilterNode::Group {
                kind: GroupKind::Or,
                children,
            });
        }
    }

    for (field, value) in map {
        if field == AND_KEY || field == OR_KEY {
            continue;
        }
        parts.push(FilterNode::Field(parse_field(field, value, depth, max_depth)?));
    }

    if parts.len() == 1 {
        return Ok(parts.remove(0));
    }
    Ok(FilterNode::Group {
        kind: GroupKind::And,
        children: parts,
    })
}

fn parse_members(
    key: &str,
    members: &Value,
    depth: usize,
    max_depth: usize,
) -> Result<Vec<FilterNode>, QueryError> {
    let Value::Array(items) = members else {
        return Err(QueryError::InvalidFilter(format!(
            "{} must be an array of filters",
            key
        )));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => parse_object(map, depth + 1, max_depth),
            other => Err(QueryError::InvalidFilter(format!(
                "{} members must be objects, got {}",
                key, other
            ))),
        })
        .collect()
}

fn parse_field(
    field: &str,
    value: &Value,
    depth: usize,
    max_depth: usize,
) -> Result<FieldFilter, QueryError> {
    let Value::Object(entries) = value else {
        return Err(QueryError::InvalidFieldValue {
            field: field.to_string(),
        });
    };

    let condition = if is_nested(entries) {
        FieldCondition::Nested(Box::new(parse_object(entries, depth + 1, max_depth)?))
    } else {
        let comparisons = entries
            .iter()
            .map(|(name, operand)| {
                Ok(Comparison {
                    operator: name.parse::<Operator>()?,
                    value: operand.clone(),
                })
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        FieldCondition::Comparisons(comparisons)
    };

    Ok(FieldFilter {
        field: field.to_string(),
        condition,
    })
}

/// A field value is a nested filter when no key is an operator and every
/// value is itself a document (or an `and`/`or` list)
fn is_nested(entries: &Map<String, Value>) -> bool {
    !entries.is_empty()
        && entries.iter().all(|(key, value)| {
            if Operator::is_operator(key) {
                return false;
            }
            match value {
                Value::Object(_) => true,
                Value::Array(_) => key == AND_KEY || key == OR_KEY,
                _ => false,
            }
        })
}
