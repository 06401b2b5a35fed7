//! Filter tree definitions
//!
//! A filter is parsed once from untyped JSON into this tagged tree; the
//! compiler never inspects raw maps.

use serde::Deserialize;
use serde_json::Value;

use super::comparison::Operator;
use super::parser::parse_filter;
use crate::core::constants::DEFAULT_MAX_FILTER_DEPTH;
use crate::query::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum FilterNode {
    Group {
        kind: GroupKind,
        children: Vec<FilterNode>,
    },
    Field(FieldFilter),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub condition: FieldCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Operator map on a scalar field, implicitly conjoined
    Comparisons(Vec<Comparison>),
    /// Full filter over a related entity
    Nested(Box<FilterNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub operator: Operator,
    pub value: Value,
}

impl Default for FilterNode {
    fn default() -> Self {
        Self::match_all()
    }
}

impl FilterNode {
    /// The empty conjunction
    pub fn match_all() -> Self {
        Self::Group {
            kind: GroupKind::And,
            children: Vec::new(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::Group { kind: GroupKind::And, children } if children.is_empty())
    }

    /// Field leaves reachable through AND/OR groups, not through relations
    pub fn field_filters(&self) -> Vec<&FieldFilter> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldFilter>) {
        match self {
            Self::Group { children, .. } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Field(field) => out.push(field),
        }
    }
}

impl TryFrom<Value> for FilterNode {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        parse_filter(&value, DEFAULT_MAX_FILTER_DEPTH)
    }
}
