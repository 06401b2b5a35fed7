//! Compiled query plans handed to a store

use super::aggregate::AggregateColumn;
use super::keyset::Direction;
use super::predicate::{ColumnRef, Predicate};
use super::relation::JoinSpec;
use super::sort::SortKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub descending: bool,
    /// Ordered by instant rather than by stored representation
    pub temporal: bool,
}

/// Column projected under a result key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub column: ColumnRef,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub table: String,
    pub columns: Vec<Projection>,
    pub joins: Vec<JoinSpec>,
    pub filter: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: u64,
    /// Set when a to-many join can repeat root rows
    pub distinct: bool,
}

/// Row count over the filtered (and de-duplicated) root rows
#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan {
    pub table: String,
    pub joins: Vec<JoinSpec>,
    pub filter: Option<Predicate>,
    /// Primary-key columns used to de-duplicate when `distinct` is set
    pub key_columns: Vec<ColumnRef>,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    pub table: String,
    pub joins: Vec<JoinSpec>,
    pub filter: Option<Predicate>,
    pub columns: Vec<AggregateColumn>,
}

impl AggregatePlan {
    pub fn group_by(&self) -> Vec<&ColumnRef> {
        self.columns
            .iter()
            .filter(|c| c.is_group())
            .map(|c| &c.column)
            .collect()
    }
}

/// Select plan of a cursor page plus what is needed to post-process it
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPlan {
    pub select: SelectPlan,
    /// Normalized keys, primary-key tie-break included
    pub keys: Vec<SortKey>,
    /// Rows requested by the caller; the select fetches one more
    pub limit: u64,
    pub direction: Direction,
}

impl CursorPlan {
    /// Result keys projected only to derive cursors
    pub fn helper_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|k| !k.is_root())
            .map(|k| k.field.as_str())
    }
}

/// Combine optional filter parts into one predicate
pub fn conjoin(parts: impl IntoIterator<Item = Option<Predicate>>) -> Option<Predicate> {
    let parts: Vec<Predicate> = parts
        .into_iter()
        .flatten()
        .filter(|p| !p.is_trivial())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(Predicate::and(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::{CompareOp, SqlValue};

    #[test]
    fn test_conjoin() {
        let leaf = Predicate::compare(ColumnRef::bare("a"), CompareOp::Eq, SqlValue::Int(1));
        assert_eq!(conjoin([None, Some(Predicate::And(vec![]))]), None);
        assert_eq!(conjoin([Some(leaf.clone()), None]), Some(leaf.clone()));
        assert_eq!(
            conjoin([Some(leaf.clone()), Some(leaf.clone())]),
            Some(Predicate::And(vec![leaf.clone(), leaf]))
        );
    }
}
