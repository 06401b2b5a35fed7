//! Error type for query compilation
//!
//! Every failure the compiler can produce is request-scoped: it is returned
//! to the caller verbatim and never retried internally.

use thiserror::Error;

/// Coarse classification of compile failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed DSL input (operand shapes, non-map field values, limits)
    Shape,
    /// Names that do not resolve (operators, fields, relations, cursor arity)
    Reference,
    /// Opaque inputs that fail to decode (cursors, aggregate columns, timestamps)
    Decode,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("operator not found: {0}")]
    UnknownOperator(String),

    #[error("invalid value for between, expected {{lower, upper}}, got {0}")]
    InvalidBetween(String),

    #[error("invalid value for {operator}, expected a list, got {value}")]
    InvalidList {
        operator: &'static str,
        value: String,
    },

    #[error("invalid operand for {field}: {value}")]
    InvalidOperand { field: String, value: String },

    #[error("invalid value for field {field}, expected an operator map")]
    InvalidFieldValue { field: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown field {field} on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("unknown sort field: {0}")]
    UnknownSortField(String),

    #[error("cannot sort by {0} through a to-many relation")]
    ToManySortField(String),

    #[error("relation {0} requires a nested filter")]
    RelationRequiresFilter(String),

    #[error("field {0} is not a relation")]
    NotARelation(String),

    #[error("cursor field count does not match sort field count (cursor: {cursor}, sort: {sort})")]
    CursorLengthMismatch { cursor: usize, sort: usize },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("unsupported value for temporal field {field}: {value}")]
    UnsupportedTemporal { field: String, value: String },

    #[error("unknown aggregate column encountered for {0}")]
    UnknownAggregateColumn(String),

    #[error("no aggregate fields found")]
    NoAggregateFields,

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),
}

impl QueryError {
    pub fn unknown_field(entity: &str, field: &str) -> Self {
        Self::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_operand(field: &str, value: impl ToString) -> Self {
        Self::InvalidOperand {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn unsupported_temporal(field: &str, value: impl ToString) -> Self {
        Self::UnsupportedTemporal {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Classify the error for callers that map failures to responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBetween(_)
            | Self::InvalidList { .. }
            | Self::InvalidOperand { .. }
            | Self::InvalidFieldValue { .. }
            | Self::InvalidFilter(_)
            | Self::RelationRequiresFilter(_)
            | Self::NotARelation(_)
            | Self::NoAggregateFields
            | Self::ToManySortField(_)
            | Self::InvalidPagination(_) => ErrorKind::Shape,
            Self::UnknownOperator(_)
            | Self::UnknownEntity(_)
            | Self::UnknownField { .. }
            | Self::UnknownSortField(_)
            | Self::CursorLengthMismatch { .. } => ErrorKind::Reference,
            Self::InvalidCursor(_)
            | Self::UnsupportedTemporal { .. }
            | Self::UnknownAggregateColumn(_) => ErrorKind::Decode,
        }
    }
}
