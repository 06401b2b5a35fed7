//! Shared fixtures for compiler tests

use super::metadata::{
    DataType, EntityMetadata, FieldMeta, MetadataRegistry, RelationKind, RelationMeta,
};

/// user -> organization (belongs to), organization -> owner (belongs to user),
/// user -> posts (has many)
pub fn registry() -> MetadataRegistry {
    let user = EntityMetadata::new(
        "user",
        vec![
            FieldMeta::new("id", DataType::Integer),
            FieldMeta::new("name", DataType::String),
            FieldMeta::new("email", DataType::String),
            FieldMeta::new("age", DataType::Integer),
            FieldMeta::new("country", DataType::String),
            FieldMeta::new("birthday", DataType::Timestamp),
            FieldMeta::new("organization_id", DataType::Integer).with_column("org_id"),
        ],
    )
    .with_table("users")
    .with_relation(RelationMeta {
        name: "organization".into(),
        target: "organization".into(),
        kind: RelationKind::BelongsTo,
        local_key: "organization_id".into(),
        foreign_key: "id".into(),
    })
    .with_relation(RelationMeta {
        name: "posts".into(),
        target: "post".into(),
        kind: RelationKind::HasMany,
        local_key: "id".into(),
        foreign_key: "author_id".into(),
    });

    let organization = EntityMetadata::new(
        "organization",
        vec![
            FieldMeta::new("id", DataType::Integer),
            FieldMeta::new("name", DataType::String),
            FieldMeta::new("owner_id", DataType::Integer),
        ],
    )
    .with_table("organizations")
    .with_relation(RelationMeta {
        name: "owner".into(),
        target: "user".into(),
        kind: RelationKind::BelongsTo,
        local_key: "owner_id".into(),
        foreign_key: "id".into(),
    });

    let post = EntityMetadata::new(
        "post",
        vec![
            FieldMeta::new("id", DataType::Integer),
            FieldMeta::new("title", DataType::String),
            FieldMeta::new("score", DataType::Float),
            FieldMeta::new("author_id", DataType::Integer),
        ],
    )
    .with_table("posts");

    MetadataRegistry::new(vec![user, organization, post]).expect("fixture schema is valid")
}
