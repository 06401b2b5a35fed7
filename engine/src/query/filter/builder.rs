//! Where builder
//!
//! Compiles a parsed filter tree into a single predicate. Columns on the root
//! entity are qualified by its table; columns reached through a relation are
//! qualified by the relation's alias path.

use super::comparison::resolve;
use super::types::{FieldCondition, FieldFilter, FilterNode, GroupKind};
use crate::query::error::QueryError;
use crate::query::metadata::{EntityMetadata, MetadataProvider};
use crate::query::predicate::{ColumnRef, Predicate};
use crate::query::relation::{RelationRequirement, join_path};

pub struct WhereBuilder<'a, P: MetadataProvider + ?Sized> {
    provider: &'a P,
}

impl<'a, P: MetadataProvider + ?Sized> WhereBuilder<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Compile `filter` against `entity`
    ///
    /// `relations` is the requirement built from the same filter and `path`
    /// the alias path of `entity` (empty for the root).
    pub fn compile(
        &self,
        filter: &FilterNode,
        entity: &EntityMetadata,
        relations: &RelationRequirement,
        path: &str,
    ) -> Result<Predicate, QueryError> {
        let predicate = self.compile_node(filter, entity, relations, path)?;
        tracing::trace!(
            entity = %entity.name,
            path,
            leaves = predicate.leaf_count(),
            "Compiled filter"
        );
        Ok(predicate)
    }

    fn compile_node(
        &self,
        node: &FilterNode,
        entity: &EntityMetadata,
        relations: &RelationRequirement,
        path: &str,
    ) -> Result<Predicate, QueryError> {
        match node {
            FilterNode::Group { kind, children } => {
                let parts = children
                    .iter()
                    .map(|child| self.compile_node(child, entity, relations, path))
                    .collect::<Result<Vec<_>, _>>()?;
                // An always-true member absorbs a disjunction and vanishes from a conjunction
                if *kind == GroupKind::Or && parts.iter().any(Predicate::is_trivial) {
                    return Ok(Predicate::And(Vec::new()));
                }
                let parts: Vec<Predicate> = parts.into_iter().filter(|p| !p.is_trivial()).collect();
                Ok(match kind {
                    GroupKind::And => Predicate::and(parts),
                    GroupKind::Or => Predicate::or(parts),
                })
            }
            FilterNode::Field(field) => self.compile_field(field, entity, relations, path),
        }
    }

    fn compile_field(
        &self,
        filter: &FieldFilter,
        entity: &EntityMetadata,
        relations: &RelationRequirement,
        path: &str,
    ) -> Result<Predicate, QueryError> {
        match &filter.condition {
            FieldCondition::Nested(nested) => {
                if !entity.is_relation(&filter.field) {
                    return Err(match entity.field(&filter.field) {
                        Some(_) => QueryError::NotARelation(filter.field.clone()),
                        None => QueryError::unknown_field(&entity.name, &filter.field),
                    });
                }
                let (_, target) = self.provider.related(entity, &filter.field)?;
                let empty = RelationRequirement::default();
                let scoped = relations.get(&filter.field).unwrap_or(&empty);
                self.compile_node(nested, target, scoped, &join_path(path, &filter.field))
            }
            FieldCondition::Comparisons(comparisons) => {
                if entity.is_relation(&filter.field) {
                    return Err(QueryError::RelationRequiresFilter(filter.field.clone()));
                }
                let meta = entity.require_field(&filter.field)?;
                let qualifier = if path.is_empty() { entity.table() } else { path };
                let parts = comparisons
                    .iter()
                    .map(|c| resolve(ColumnRef::new(qualifier, meta.column()), c.operator, &c.value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::and(parts))
            }
        }
    }
}
