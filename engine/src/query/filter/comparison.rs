//! Comparison operators and leaf resolution
//!
//! The operator vocabulary is closed. Each `(column, operator, value)` leaf
//! maps to exactly one predicate shape.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::query::error::QueryError;
use crate::query::predicate::{ColumnRef, CompareOp, Predicate, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Like,
        Operator::NotLike,
        Operator::ILike,
        Operator::NotILike,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::NotBetween,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::NotLike => "notlike",
            Operator::ILike => "ilike",
            Operator::NotILike => "notilike",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Between => "between",
            Operator::NotBetween => "notbetween",
        }
    }

    /// Whether a filter key names an operator
    pub fn is_operator(name: &str) -> bool {
        Self::ALL.iter().any(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::UnknownOperator(s.to_string()))
    }
}

/// Resolve one comparison leaf into a predicate
pub fn resolve(column: ColumnRef, operator: Operator, value: &Value) -> Result<Predicate, QueryError> {
    let predicate = match operator {
        Operator::Eq => compare(column, CompareOp::Eq, value)?,
        Operator::Neq => compare(column, CompareOp::Neq, value)?,
        Operator::Gt => compare(column, CompareOp::Gt, value)?,
        Operator::Gte => compare(column, CompareOp::Gte, value)?,
        Operator::Lt => compare(column, CompareOp::Lt, value)?,
        Operator::Lte => compare(column, CompareOp::Lte, value)?,
        Operator::Like => like(column, value, false)?,
        Operator::NotLike => like(column, value, false)?.negate(),
        Operator::ILike => like(column, value, true)?,
        // Negates the case-insensitive match
        Operator::NotILike => like(column, value, true)?.negate(),
        Operator::In => membership(column, operator, value)?,
        Operator::NotIn => membership(column, operator, value)?.negate(),
        Operator::Between => between(column, value)?,
        Operator::NotBetween => between(column, value)?.negate(),
    };
    Ok(predicate)
}

fn scalar(column: &ColumnRef, value: &Value) -> Result<SqlValue, QueryError> {
    SqlValue::from_json(value).ok_or_else(|| QueryError::invalid_operand(&column.to_string(), value))
}

fn compare(column: ColumnRef, op: CompareOp, value: &Value) -> Result<Predicate, QueryError> {
    let value = scalar(&column, value)?;
    Ok(Predicate::compare(column, op, value))
}

fn like(column: ColumnRef, value: &Value, case_insensitive: bool) -> Result<Predicate, QueryError> {
    let Value::String(pattern) = value else {
        return Err(QueryError::invalid_operand(&column.to_string(), value));
    };
    Ok(Predicate::Like {
        column,
        pattern: pattern.clone(),
        case_insensitive,
    })
}

fn membership(column: ColumnRef, operator: Operator, value: &Value) -> Result<Predicate, QueryError> {
    let Value::Array(items) = value else {
        return Err(QueryError::InvalidList {
            operator: operator.as_str(),
            value: value.to_string(),
        });
    };
    let values = items
        .iter()
        .map(|item| scalar(&column, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Predicate::In { column, values })
}

fn between(column: ColumnRef, value: &Value) -> Result<Predicate, QueryError> {
    let bounds = value.as_object().and_then(|range| {
        let lower = range.get("lower").filter(|v| !v.is_null())?;
        let upper = range.get("upper").filter(|v| !v.is_null())?;
        Some((lower, upper))
    });
    let Some((lower, upper)) = bounds else {
        return Err(QueryError::InvalidBetween(value.to_string()));
    };

    let lower = scalar(&column, lower)?;
    let upper = scalar(&column, upper)?;
    Ok(Predicate::And(vec![
        Predicate::compare(column.clone(), CompareOp::Gte, lower),
        Predicate::compare(column, CompareOp::Lte, upper),
    ]))
}
