//! Backend-neutral predicate tree
//!
//! The compiler produces these; stores either render them to SQL
//! (`data::sql::render`) or evaluate them directly (`data::memory`).

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Operand value bound into a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Convert a JSON scalar. Arrays and objects are not operands.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => Value::String(format_timestamp(ts)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Canonical textual form for stored and bound timestamps
///
/// Fixed millisecond precision keeps text order equal to time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "'{}'", s),
            Self::Timestamp(ts) => write!(f, "'{}'", format_timestamp(ts)),
        }
    }
}

/// Column reference, optionally qualified by a table name or alias path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(qualifier: &str, name: &str) -> Self {
        Self {
            qualifier: (!qualifier.is_empty()).then(|| qualifier.to_string()),
            name: name.to_string(),
        }
    }

    pub fn bare(name: &str) -> Self {
        Self {
            qualifier: None,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`; `Eq`/`Neq` against `Null` mean `IS [NOT] NULL`
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: SqlValue,
    },
    /// SQL LIKE pattern match (`%` and `_` wildcards)
    Like {
        column: ColumnRef,
        pattern: String,
        case_insensitive: bool,
    },
    In {
        column: ColumnRef,
        values: Vec<SqlValue>,
    },
    Not(Box<Predicate>),
    /// Conjunction; empty means always true
    And(Vec<Predicate>),
    /// Disjunction; empty means always false
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(column: ColumnRef, op: CompareOp, value: SqlValue) -> Self {
        Self::Compare { column, op, value }
    }

    /// Conjoin, collapsing a single part to itself
    pub fn and(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self::And(parts)
    }

    /// Disjoin, collapsing a single part to itself
    pub fn or(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self::Or(parts)
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// True for the empty conjunction
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::And(parts) if parts.is_empty())
    }

    /// Number of leaf comparisons, for logging
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Compare { .. } | Self::Like { .. } | Self::In { .. } => 1,
            Self::Not(inner) => inner.leaf_count(),
            Self::And(parts) | Self::Or(parts) => parts.iter().map(Self::leaf_count).sum(),
        }
    }
}
