//! Entity metadata consumed by the compiler
//!
//! Metadata is built once (usually from a schema JSON file), validated, and
//! then shared read-only by every compile call. Relations point at their target
//! by entity name, so cyclic relation graphs need no shared ownership.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::QueryError;

/// Column data type, used to normalize cursor and operand values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Json,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "string"),
            DataType::Integer => write!(f, "integer"),
            DataType::Float => write!(f, "float"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldMeta {
    pub name: String,
    /// Backing column; defaults to the field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(rename = "type", default)]
    pub data_type: DataType,
}

impl FieldMeta {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            column: None,
            data_type,
        }
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A named relation to another entity
///
/// The join condition is always `parent.local_key = child.foreign_key`, where
/// `local_key` is a field of the owning entity and `foreign_key` a field of
/// the target.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelationMeta {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    pub local_key: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EntityMetadata {
    pub name: String,
    /// Backing table; defaults to the entity name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,
    pub fields: Vec<FieldMeta>,
    #[serde(default)]
    pub relations: Vec<RelationMeta>,
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

impl EntityMetadata {
    pub fn new(name: &str, fields: Vec<FieldMeta>) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: default_primary_key(),
            fields,
            relations: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn with_primary_key(mut self, keys: &[&str]) -> Self {
        self.primary_key = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_relation(mut self, relation: RelationMeta) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    /// Field lookup that reports unknown names as compile errors
    pub fn require_field(&self, name: &str) -> Result<&FieldMeta, QueryError> {
        self.field(name)
            .ok_or_else(|| QueryError::unknown_field(&self.name, name))
    }

    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.primary_key.iter().filter_map(|k| self.field(k))
    }
}

/// Read-only source of entity metadata
pub trait MetadataProvider: Send + Sync {
    fn entity(&self, name: &str) -> Option<&EntityMetadata>;

    fn require(&self, name: &str) -> Result<&EntityMetadata, QueryError> {
        self.entity(name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    /// Resolve the target entity of a relation declared on `entity`
    fn related<'s>(
        &'s self,
        entity: &'s EntityMetadata,
        relation: &str,
    ) -> Result<(&'s RelationMeta, &'s EntityMetadata), QueryError> {
        let meta = entity
            .relation(relation)
            .ok_or_else(|| QueryError::NotARelation(relation.to_string()))?;
        let target = self.require(&meta.target)?;
        Ok((meta, target))
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("Duplicate field {field} on {entity}")]
    DuplicateField { entity: String, field: String },

    #[error("Entity {entity} declares unknown key field {field}")]
    UnknownKey { entity: String, field: String },

    #[error("Relation {relation} on {entity} targets unknown entity {target}")]
    UnknownTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("Entity {0} has no primary key")]
    MissingPrimaryKey(String),
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    entities: Vec<EntityMetadata>,
}

/// Validated, immutable set of entities
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new(entities: Vec<EntityMetadata>) -> Result<Self, MetadataError> {
        let mut map = HashMap::with_capacity(entities.len());
        for entity in entities {
            if map.contains_key(&entity.name) {
                return Err(MetadataError::DuplicateEntity(entity.name));
            }
            map.insert(entity.name.clone(), entity);
        }
        let registry = Self { entities: map };
        registry.validate()?;
        tracing::debug!(entities = registry.entities.len(), "Metadata registry built");
        Ok(registry)
    }

    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        Self::new(file.entities)
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        tracing::debug!(path = %path.display(), "Loading schema file");
        let content = fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn validate(&self) -> Result<(), MetadataError> {
        for entity in self.entities.values() {
            let mut seen = std::collections::HashSet::new();
            for field in &entity.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(MetadataError::DuplicateField {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }

            if entity.primary_key.is_empty() {
                return Err(MetadataError::MissingPrimaryKey(entity.name.clone()));
            }
            for key in &entity.primary_key {
                if entity.field(key).is_none() {
                    return Err(MetadataError::UnknownKey {
                        entity: entity.name.clone(),
                        field: key.clone(),
                    });
                }
            }

            for relation in &entity.relations {
                let Some(target) = self.entities.get(&relation.target) else {
                    return Err(MetadataError::UnknownTarget {
                        entity: entity.name.clone(),
                        relation: relation.name.clone(),
                        target: relation.target.clone(),
                    });
                };
                if entity.field(&relation.local_key).is_none() {
                    return Err(MetadataError::UnknownKey {
                        entity: entity.name.clone(),
                        field: relation.local_key.clone(),
                    });
                }
                if target.field(&relation.foreign_key).is_none() {
                    return Err(MetadataError::UnknownKey {
                        entity: target.name.clone(),
                        field: relation.foreign_key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::registry;

    #[test]
    fn test_field_column_defaults_to_name() {
        let field = FieldMeta::new("age", DataType::Integer);
        assert_eq!(field.column(), "age");
        let field = field.with_column("user_age");
        assert_eq!(field.column(), "user_age");
    }

    #[test]
    fn test_registry_lookup() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        assert_eq!(user.table(), "users");
        assert!(user.is_relation("organization"));
        assert!(!user.is_relation("name"));
        assert_eq!(reg.names(), vec!["organization", "post", "user"]);
    }

    #[test]
    fn test_require_unknown_entity() {
        let reg = registry();
        assert_eq!(
            reg.require("ghost").unwrap_err(),
            QueryError::UnknownEntity("ghost".into())
        );
    }

    #[test]
    fn test_related_resolves_target() {
        let reg = registry();
        let user = reg.require("user").unwrap();
        let (rel, target) = reg.related(user, "organization").unwrap();
        assert_eq!(rel.kind, RelationKind::BelongsTo);
        assert_eq!(target.name, "organization");
        assert!(matches!(
            reg.related(user, "age"),
            Err(QueryError::NotARelation(_))
        ));
    }

    #[test]
    fn test_from_json_str_defaults() {
        let json = r#"{
            "entities": [
                {"name": "tag", "fields": [{"name": "id", "type": "integer"}, {"name": "label"}]}
            ]
        }"#;
        let reg = MetadataRegistry::from_json_str(json).unwrap();
        let tag = reg.require("tag").unwrap();
        assert_eq!(tag.table(), "tag");
        assert_eq!(tag.primary_key, vec!["id"]);
        assert_eq!(tag.field("label").unwrap().data_type, DataType::String);
    }

    #[test]
    fn test_validate_unknown_target() {
        let entity = EntityMetadata::new("a", vec![FieldMeta::new("id", DataType::Integer)])
            .with_relation(RelationMeta {
                name: "b".into(),
                target: "b".into(),
                kind: RelationKind::HasOne,
                local_key: "id".into(),
                foreign_key: "a_id".into(),
            });
        let err = MetadataRegistry::new(vec![entity]).unwrap_err();
        assert!(matches!(err, MetadataError::UnknownTarget { .. }));
    }

    #[test]
    fn test_validate_unknown_primary_key() {
        let entity = EntityMetadata::new("a", vec![FieldMeta::new("code", DataType::String)]);
        let err = MetadataRegistry::new(vec![entity]).unwrap_err();
        assert_eq!(err.to_string(), "Entity a declares unknown key field id");
    }

    #[test]
    fn test_validate_duplicate_field() {
        let entity = EntityMetadata::new(
            "a",
            vec![
                FieldMeta::new("id", DataType::Integer),
                FieldMeta::new("id", DataType::String),
            ],
        );
        assert!(matches!(
            MetadataRegistry::new(vec![entity]),
            Err(MetadataError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"entities": [{"name": "t", "fields": [{"name": "id", "type": "integer"}]}]}"#,
        )
        .unwrap();
        let reg = MetadataRegistry::load(&path).unwrap();
        assert!(reg.entity("t").is_some());

        let missing = MetadataRegistry::load(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(MetadataError::Io { .. })));
    }
}
