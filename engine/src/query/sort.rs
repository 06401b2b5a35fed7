//! Sort token normalization
//!
//! Tokens are `-field` (descending), `+field` or `field` (ascending). Bare
//! fields are qualified with the entity's table; `relation.field` tokens are
//! resolved through metadata and pull the relation into the join set.

use super::error::QueryError;
use super::metadata::{DataType, EntityMetadata, MetadataProvider, RelationKind};
use super::predicate::ColumnRef;
use super::relation::{PATH_SEPARATOR, RelationRequirement};

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Field path as requested, without any table prefix
    pub field: String,
    pub column: ColumnRef,
    pub descending: bool,
    pub data_type: DataType,
}

impl SortKey {
    /// Whether the key lives on the root entity rather than a relation
    pub fn is_root(&self) -> bool {
        !self.field.contains(PATH_SEPARATOR)
    }
}

/// Normalized ordering plus the relations it needs joined
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
    pub relations: RelationRequirement,
}

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.field.as_str()).collect()
    }

    /// Append primary-key fields (ascending) that are not already sorted on,
    /// making the ordering total
    pub fn ensure_tiebreaker(&mut self, entity: &EntityMetadata) {
        for pk in entity.primary_key_fields() {
            if self.keys.iter().any(|k| k.field == pk.name) {
                continue;
            }
            self.keys.push(SortKey {
                field: pk.name.clone(),
                column: ColumnRef::new(entity.table(), pk.column()),
                descending: false,
                data_type: pk.data_type,
            });
        }
    }
}

/// Split a token into field and direction
pub fn parse_token(token: &str) -> (&str, bool) {
    let token = token.trim();
    if let Some(field) = token.strip_prefix('-') {
        (field.trim(), true)
    } else if let Some(field) = token.strip_prefix('+') {
        (field.trim(), false)
    } else {
        (token, false)
    }
}

pub fn normalize<P: MetadataProvider + ?Sized>(
    tokens: &[String],
    entity: &EntityMetadata,
    provider: &P,
) -> Result<SortSpec, QueryError> {
    let mut spec = SortSpec::default();
    for token in tokens {
        let (field, descending) = parse_token(token);
        if field.is_empty() {
            return Err(QueryError::UnknownSortField(token.clone()));
        }
        let key = resolve_key(field, descending, entity, provider, &mut spec.relations)?;
        if spec.keys.iter().any(|k| k.field == key.field) {
            tracing::debug!(field = %key.field, "Ignoring repeated sort field");
            continue;
        }
        spec.keys.push(key);
    }
    tracing::trace!(entity = %entity.name, keys = ?spec.fields(), "Normalized sort");
    Ok(spec)
}

fn resolve_key<P: MetadataProvider + ?Sized>(
    field: &str,
    descending: bool,
    entity: &EntityMetadata,
    provider: &P,
    relations: &mut RelationRequirement,
) -> Result<SortKey, QueryError> {
    let unknown = || QueryError::UnknownSortField(field.to_string());
    let segments: Vec<&str> = field.split(PATH_SEPARATOR).collect();

    let root_field = match segments.as_slice() {
        [name] => Some(*name),
        [prefix, name] if *prefix == entity.table() || *prefix == entity.name => {
            entity.field(name).map(|_| *name)
        }
        _ => None,
    };
    if let Some(name) = root_field {
        let meta = entity.field(name).ok_or_else(unknown)?;
        return Ok(SortKey {
            field: meta.name.clone(),
            column: ColumnRef::new(entity.table(), meta.column()),
            descending,
            data_type: meta.data_type,
        });
    }

    let Some((last, path)) = segments.split_last() else {
        return Err(unknown());
    };
    let mut current = entity;
    for relation in path {
        let (meta, target) = provider.related(current, relation).map_err(|_| unknown())?;
        // One sort value per root row; a to-many hop would repeat rows
        if meta.kind == RelationKind::HasMany {
            return Err(QueryError::ToManySortField(field.to_string()));
        }
        current = target;
    }
    let meta = current.field(last).ok_or_else(unknown)?;
    relations.insert_path(path);

    let alias = field
        .rsplit_once(PATH_SEPARATOR)
        .map(|(alias, _)| alias)
        .unwrap_or_default();
    Ok(SortKey {
        field: field.to_string(),
        column: ColumnRef::new(alias, meta.column()),
        descending,
        data_type: meta.data_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::registry;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("-age"), ("age", true));
        assert_eq!(parse_token("+age"), ("age", false));
        assert_eq!(parse_token("age"), ("age", false));
        assert_eq!(parse_token(" -name "), ("name", true));
    }

    #[test]
    fn test_bare_fields_are_table_qualified() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let spec = normalize(&tokens(&["-age", "organization_id"]), user, &reg).unwrap();
        assert_eq!(spec.keys[0].column, ColumnRef::new("users", "age"));
        assert!(spec.keys[0].descending);
        assert_eq!(spec.keys[1].column, ColumnRef::new("users", "org_id"));
        assert!(!spec.keys[1].descending);
        assert!(spec.relations.is_empty());
    }

    #[test]
    fn test_table_prefixed_field_is_root() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let spec = normalize(&tokens(&["users.name"]), user, &reg).unwrap();
        assert_eq!(spec.keys[0].field, "name");
        assert!(spec.keys[0].is_root());
    }

    #[test]
    fn test_relation_field_requires_join() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let spec = normalize(&tokens(&["organization.owner.name"]), user, &reg).unwrap();
        let key = &spec.keys[0];
        assert_eq!(key.column, ColumnRef::new("organization.owner", "name"));
        assert!(!key.is_root());
        assert!(spec.relations.get("organization").unwrap().contains("owner"));
    }

    #[test]
    fn test_unknown_sort_fields() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        for bad in ["-nickname", "organization.motto", "ghost.name", "-"] {
            let err = normalize(&tokens(&[bad]), user, &reg).unwrap_err();
            assert!(matches!(err, QueryError::UnknownSortField(_)), "{bad}");
        }
    }

    #[test]
    fn test_to_many_relation_cannot_be_sorted_on() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        for path in ["posts.score", "-posts.title"] {
            let err = normalize(&tokens(&[path]), user, &reg).unwrap_err();
            assert!(matches!(err, QueryError::ToManySortField(_)), "{path}");
            assert_eq!(err.kind(), crate::query::ErrorKind::Shape);
        }
        // Unknown fields behind the relation still fail the to-many check first
        let err = normalize(&tokens(&["posts.ghost"]), user, &reg).unwrap_err();
        assert!(matches!(err, QueryError::ToManySortField(_)));
    }

    #[test]
    fn test_primary_key_tiebreak_appended() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let mut spec = normalize(&tokens(&["-birthday"]), user, &reg).unwrap();
        spec.ensure_tiebreaker(user);
        let keys: Vec<(&str, bool)> = spec
            .keys
            .iter()
            .map(|k| (k.field.as_str(), k.descending))
            .collect();
        assert_eq!(keys, vec![("birthday", true), ("id", false)]);
        assert_eq!(spec.keys[1].column, ColumnRef::new("users", "id"));
    }

    #[test]
    fn test_tiebreak_keeps_explicit_primary_key_direction() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let mut spec = normalize(&tokens(&["-id", "name"]), user, &reg).unwrap();
        spec.ensure_tiebreaker(user);
        assert_eq!(spec.fields(), vec!["id", "name"]);
        assert!(spec.keys[0].descending);
    }

    #[test]
    fn test_repeated_field_ignored() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let spec = normalize(&tokens(&["age", "-age"]), user, &reg).unwrap();
        assert_eq!(spec.len(), 1);
        assert!(!spec.keys[0].descending);
    }
}
