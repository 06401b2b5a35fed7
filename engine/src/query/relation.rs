//! Relation resolution and join planning
//!
//! A filter (or a relation-qualified sort key) may reach into related
//! entities. This module derives the nested set of relations a request
//! touches and turns it into an ordered list of joins.

use std::collections::{BTreeMap, BTreeSet};

use super::error::QueryError;
use super::filter::{FieldCondition, FilterNode};
use super::metadata::{EntityMetadata, MetadataProvider, RelationKind};

/// Separator between relation names in an alias path
pub const PATH_SEPARATOR: char = '.';

/// Nested map of relations touched by a request, recomputed per query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationRequirement {
    children: BTreeMap<String, RelationRequirement>,
}

impl RelationRequirement {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, relation: &str) -> Option<&RelationRequirement> {
        self.children.get(relation)
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.children.contains_key(relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RelationRequirement)> {
        self.children.iter()
    }

    /// Add (or deepen) the requirement for `relation`
    pub fn insert(&mut self, relation: &str, nested: RelationRequirement) {
        self.children
            .entry(relation.to_string())
            .or_default()
            .merge(nested);
    }

    /// Require every relation along `path`
    pub fn insert_path(&mut self, path: &[&str]) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        self.children
            .entry((*first).to_string())
            .or_default()
            .insert_path(rest);
    }

    pub fn merge(&mut self, other: RelationRequirement) {
        for (name, nested) in other.children {
            self.insert(&name, nested);
        }
    }
}

/// Join the parent alias path and a relation name
pub fn join_path(parent: &str, relation: &str) -> String {
    if parent.is_empty() {
        relation.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, relation)
    }
}

/// Every field name referenced at this level, through AND/OR groups
pub fn fields_referenced(filter: &FilterNode) -> BTreeSet<String> {
    filter
        .field_filters()
        .into_iter()
        .map(|f| f.field.clone())
        .collect()
}

/// Referenced fields that name relations of `entity`
pub fn relations_referenced(filter: &FilterNode, entity: &EntityMetadata) -> BTreeSet<String> {
    fields_referenced(filter)
        .into_iter()
        .filter(|field| entity.is_relation(field))
        .collect()
}

/// Build the nested relation requirement of a filter
///
/// Fields that are neither relations nor resolvable are dropped here; the
/// where builder reports them.
pub fn build_relation_map<P: MetadataProvider + ?Sized>(
    filter: &FilterNode,
    entity: &EntityMetadata,
    provider: &P,
) -> RelationRequirement {
    let mut requirement = RelationRequirement::default();
    for field in filter.field_filters() {
        let FieldCondition::Nested(nested) = &field.condition else {
            continue;
        };
        let Ok((_, target)) = provider.related(entity, &field.field) else {
            continue;
        };
        let child = build_relation_map(nested, target, provider);
        requirement.insert(&field.field, child);
    }
    requirement
}

/// One LEFT JOIN in a compiled plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub relation: String,
    /// Alias path the joined table is reachable under (`organization.owner`)
    pub alias: String,
    /// Alias (or root table) the join hangs off
    pub parent_alias: String,
    pub table: String,
    pub local_column: String,
    pub foreign_column: String,
    pub kind: RelationKind,
}

/// Plan joins depth-first, emitting one join per relation including siblings
pub fn plan_joins<P: MetadataProvider + ?Sized>(
    requirement: &RelationRequirement,
    entity: &EntityMetadata,
    provider: &P,
) -> Result<Vec<JoinSpec>, QueryError> {
    let mut joins = Vec::new();
    plan_level(requirement, entity, provider, "", &mut joins)?;
    tracing::trace!(entity = %entity.name, joins = joins.len(), "Planned joins");
    Ok(joins)
}

fn plan_level<P: MetadataProvider + ?Sized>(
    requirement: &RelationRequirement,
    entity: &EntityMetadata,
    provider: &P,
    path: &str,
    joins: &mut Vec<JoinSpec>,
) -> Result<(), QueryError> {
    for (name, nested) in requirement.iter() {
        let (relation, target) = provider.related(entity, name)?;
        let local = entity.require_field(&relation.local_key)?;
        let foreign = target.require_field(&relation.foreign_key)?;
        let alias = join_path(path, name);

        joins.push(JoinSpec {
            relation: name.clone(),
            alias: alias.clone(),
            parent_alias: if path.is_empty() {
                entity.table().to_string()
            } else {
                path.to_string()
            },
            table: target.table().to_string(),
            local_column: local.column().to_string(),
            foreign_column: foreign.column().to_string(),
            kind: relation.kind,
        });

        plan_level(nested, target, provider, &alias, joins)?;
    }
    Ok(())
}

/// Whether any join can multiply root rows
pub fn fans_out(joins: &[JoinSpec]) -> bool {
    joins.iter().any(|j| j.kind == RelationKind::HasMany)
}
