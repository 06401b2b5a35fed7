//! Query orchestration
//!
//! Composes relation resolution, filter compilation, sort normalization,
//! keyset predicates and aggregate projections into store-ready plans. The
//! builder holds only borrowed metadata and limits, so one instance can serve
//! any number of concurrent requests.

use serde_json::Value;

use super::aggregate::{AggregateQuery, build_projection};
use super::cursor;
use super::error::QueryError;
use super::filter::{FilterNode, WhereBuilder};
use super::keyset::{Direction, build_cursor_predicate};
use super::metadata::{DataType, EntityMetadata, MetadataProvider};
use super::plan::{AggregatePlan, CountPlan, CursorPlan, OrderTerm, Projection, SelectPlan, conjoin};
use super::predicate::{ColumnRef, CompareOp, Predicate, SqlValue};
use super::relation::{JoinSpec, RelationRequirement, build_relation_map, fans_out, plan_joins};
use super::sort::{SortKey, normalize};
use super::types::{CursorQuery, PageQuery};
use crate::core::constants::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};

/// Row limits applied to every compiled query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: MAX_QUERY_LIMIT,
        }
    }
}

impl QueryLimits {
    /// Apply the default and clamp into `1..=max_limit`
    pub fn clamp(&self, limit: Option<u64>) -> u64 {
        limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// Joins and compiled filter shared by every plan kind
struct Scope {
    joins: Vec<JoinSpec>,
    filter: Option<Predicate>,
}

pub struct QueryBuilder<'a, P: MetadataProvider + ?Sized> {
    provider: &'a P,
    limits: QueryLimits,
}

impl<'a, P: MetadataProvider + ?Sized> QueryBuilder<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            limits: QueryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Plain page query: filter, explicit sort, limit/offset window
    pub fn build_page_query(&self, entity: &str, query: &PageQuery) -> Result<SelectPlan, QueryError> {
        let entity = self.provider.require(entity)?;
        let sort = normalize(&query.sort, entity, self.provider)?;
        let window = query.pagination.window()?;
        let scope = self.scope(entity, &query.filter, &sort.relations)?;

        let plan = SelectPlan {
            table: entity.table().to_string(),
            columns: projection(entity, &sort.keys),
            distinct: fans_out(&scope.joins),
            joins: scope.joins,
            filter: scope.filter,
            order: order_terms(&sort.keys, false),
            limit: window.limit.map(|l| l.min(self.limits.max_limit)),
            offset: window.offset,
        };
        tracing::debug!(
            entity = %entity.name,
            joins = plan.joins.len(),
            sort = ?sort.fields(),
            limit = ?plan.limit,
            offset = plan.offset,
            "Built page query"
        );
        Ok(plan)
    }

    /// Count of rows matching `filter`; pagination does not apply
    pub fn build_count_query(&self, entity: &str, filter: &FilterNode) -> Result<CountPlan, QueryError> {
        let entity = self.provider.require(entity)?;
        let scope = self.scope(entity, filter, &RelationRequirement::default())?;
        Ok(CountPlan {
            table: entity.table().to_string(),
            key_columns: entity
                .primary_key_fields()
                .map(|f| ColumnRef::new(entity.table(), f.column()))
                .collect(),
            distinct: fans_out(&scope.joins),
            joins: scope.joins,
            filter: scope.filter,
        })
    }

    /// Keyset page: primary-key tie-break, cursor predicate and a
    /// `limit + 1` lookahead. Backward pages are fetched in reverse order.
    pub fn build_cursor_query(&self, entity: &str, query: &CursorQuery) -> Result<CursorPlan, QueryError> {
        let entity = self.provider.require(entity)?;
        let mut sort = normalize(&query.sort, entity, self.provider)?;
        sort.ensure_tiebreaker(entity);

        let values = match query.cursor.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => cursor::decode(token)?,
            _ => Vec::new(),
        };
        let keyset = build_cursor_predicate(&sort.keys, &values, query.direction)?;
        let scope = self.scope(entity, &query.filter, &sort.relations)?;
        let limit = self.limits.clamp(query.limit);
        let reverse = query.direction == Direction::Backward;

        let select = SelectPlan {
            table: entity.table().to_string(),
            columns: projection(entity, &sort.keys),
            distinct: fans_out(&scope.joins),
            joins: scope.joins,
            filter: conjoin([scope.filter, keyset]),
            order: order_terms(&sort.keys, reverse),
            limit: Some(limit + 1),
            offset: 0,
        };
        tracing::debug!(
            entity = %entity.name,
            sort = ?sort.fields(),
            direction = %query.direction,
            has_cursor = !values.is_empty(),
            limit,
            "Built cursor query"
        );
        Ok(CursorPlan {
            select,
            keys: sort.keys,
            limit,
            direction: query.direction,
        })
    }

    pub fn build_aggregate_query(
        &self,
        entity: &str,
        filter: &FilterNode,
        aggregate: &AggregateQuery,
    ) -> Result<AggregatePlan, QueryError> {
        let entity = self.provider.require(entity)?;
        let columns = build_projection(aggregate, entity, "")?;
        let scope = self.scope(entity, filter, &RelationRequirement::default())?;
        tracing::debug!(
            entity = %entity.name,
            columns = columns.len(),
            joins = scope.joins.len(),
            "Built aggregate query"
        );
        Ok(AggregatePlan {
            table: entity.table().to_string(),
            joins: scope.joins,
            filter: scope.filter,
            columns,
        })
    }

    /// Single row by primary key; composite keys are given as `{field: value}`
    pub fn build_lookup(&self, entity: &str, id: &Value) -> Result<SelectPlan, QueryError> {
        let entity = self.provider.require(entity)?;
        let filter = id_predicate(entity, id)?;
        Ok(SelectPlan {
            table: entity.table().to_string(),
            columns: projection(entity, &[]),
            joins: Vec::new(),
            filter: Some(filter),
            order: Vec::new(),
            limit: Some(1),
            offset: 0,
            distinct: false,
        })
    }

    fn scope(
        &self,
        entity: &EntityMetadata,
        filter: &FilterNode,
        extra: &RelationRequirement,
    ) -> Result<Scope, QueryError> {
        let filter_relations = build_relation_map(filter, entity, self.provider);
        let predicate = WhereBuilder::new(self.provider).compile(filter, entity, &filter_relations, "")?;

        let mut relations = filter_relations;
        relations.merge(extra.clone());
        let joins = plan_joins(&relations, entity, self.provider)?;

        Ok(Scope {
            joins,
            filter: conjoin([Some(predicate)]),
        })
    }
}

/// Every field of the root entity, plus joined sort keys under their path
fn projection(entity: &EntityMetadata, keys: &[SortKey]) -> Vec<Projection> {
    let mut columns: Vec<Projection> = entity
        .fields
        .iter()
        .map(|f| Projection {
            column: ColumnRef::new(entity.table(), f.column()),
            alias: f.name.clone(),
        })
        .collect();
    columns.extend(keys.iter().filter(|k| !k.is_root()).map(|k| Projection {
        column: k.column.clone(),
        alias: k.field.clone(),
    }));
    columns
}

fn order_terms(keys: &[SortKey], reverse: bool) -> Vec<OrderTerm> {
    keys.iter()
        .map(|k| OrderTerm {
            column: k.column.clone(),
            descending: k.descending != reverse,
            temporal: k.data_type == DataType::Timestamp,
        })
        .collect()
}

fn id_predicate(entity: &EntityMetadata, id: &Value) -> Result<Predicate, QueryError> {
    let keys: Vec<_> = entity.primary_key_fields().collect();
    let bad_id = || QueryError::invalid_operand(&format!("{}.id", entity.name), id);

    let parts = match id {
        Value::Object(map) => keys
            .iter()
            .map(|key| {
                let value = map.get(&key.name).and_then(SqlValue::from_json).ok_or_else(bad_id)?;
                Ok(Predicate::compare(
                    ColumnRef::new(entity.table(), key.column()),
                    CompareOp::Eq,
                    value,
                ))
            })
            .collect::<Result<Vec<_>, QueryError>>()?,
        scalar if keys.len() == 1 => {
            let value = SqlValue::from_json(scalar).ok_or_else(bad_id)?;
            vec![Predicate::compare(
                ColumnRef::new(entity.table(), keys[0].column()),
                CompareOp::Eq,
                value,
            )]
        }
        _ => return Err(bad_id()),
    };
    Ok(Predicate::and(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cursor::CursorValue;
    use crate::query::testing::registry;
    use serde_json::json;

    fn page_query(value: Value) -> PageQuery {
        serde_json::from_value(value).unwrap()
    }

    fn cursor_query(value: Value) -> CursorQuery {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_page_query_plan() {
        let reg = registry();
        let builder = QueryBuilder::new(&reg);
        let plan = builder
            .build_page_query(
                "user",
                &page_query(json!({
                    "filter": {"age": {"gte": 18}, "organization": {"name": {"eq": "acme"}}},
                    "sort": ["-age"],
                    "pagination": {"page": 2, "size": 10}
                })),
            )
            .unwrap();
        assert_eq!(plan.table, "users");
        assert_eq!(plan.joins.len(), 1);
        assert!(!plan.distinct);
        assert_eq!(plan.limit, Some(10));
        assert_eq!(plan.offset, 10);
        assert_eq!(
            plan.order,
            vec![OrderTerm {
                column: ColumnRef::new("users", "age"),
                descending: true,
                temporal: false,
            }]
        );
        assert_eq!(plan.columns.len(), 7);
        assert!(plan.filter.is_some());
    }

    #[test]
    fn test_page_query_without_sort_has_no_tiebreak() {
        let reg = registry();
        let plan = QueryBuilder::new(&reg)
            .build_page_query("user", &PageQuery::default())
            .unwrap();
        assert!(plan.order.is_empty());
        assert!(plan.filter.is_none());
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn test_page_query_limit_clamped() {
        let reg = registry();
        let limits = QueryLimits {
            default_limit: 5,
            max_limit: 20,
        };
        let plan = QueryBuilder::new(&reg)
            .with_limits(limits)
            .build_page_query(
                "user",
                &page_query(json!({"pagination": {"limit": 500}})),
            )
            .unwrap();
        assert_eq!(plan.limit, Some(20));
    }

    #[test]
    fn test_has_many_filter_is_distinct() {
        let reg = registry();
        let plan = QueryBuilder::new(&reg)
            .build_page_query(
                "user",
                &page_query(json!({"filter": {"posts": {"score": {"gt": 3}}}})),
            )
            .unwrap();
        assert!(plan.distinct);
        let count = QueryBuilder::new(&reg)
            .build_count_query("user", &page_query(json!({"filter": {"posts": {"score": {"gt": 3}}}})).filter)
            .unwrap();
        assert!(count.distinct);
        assert_eq!(count.key_columns, vec![ColumnRef::new("users", "id")]);
    }

    #[test]
    fn test_unknown_entity() {
        let reg = registry();
        let err = QueryBuilder::new(&reg)
            .build_page_query("ghost", &PageQuery::default())
            .unwrap_err();
        assert_eq!(err, QueryError::UnknownEntity("ghost".into()));
    }

    #[test]
    fn test_cursor_query_first_page() {
        let reg = registry();
        let plan = QueryBuilder::new(&reg)
            .build_cursor_query("user", &cursor_query(json!({"sort": ["-birthday"], "limit": 5})))
            .unwrap();
        assert_eq!(plan.limit, 5);
        assert_eq!(plan.select.limit, Some(6));
        assert!(plan.select.filter.is_none());
        let fields: Vec<(&str, bool)> = plan
            .keys
            .iter()
            .map(|k| (k.field.as_str(), k.descending))
            .collect();
        assert_eq!(fields, vec![("birthday", true), ("id", false)]);
    }

    #[test]
    fn test_cursor_query_backward_reverses_order() {
        let reg = registry();
        let token = cursor::encode(&[CursorValue::Int(30), CursorValue::Int(4)]).unwrap();
        let plan = QueryBuilder::new(&reg)
            .build_cursor_query(
                "user",
                &cursor_query(json!({
                    "sort": ["-age"],
                    "direction": "backward",
                    "cursor": token,
                    "filter": {"country": {"eq": "cn"}}
                })),
            )
            .unwrap();
        let order: Vec<bool> = plan.select.order.iter().map(|o| o.descending).collect();
        assert_eq!(order, vec![false, true]);
        let Some(Predicate::And(parts)) = &plan.select.filter else {
            panic!("expected filter and keyset conjunction");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], Predicate::Or(_)));
    }

    #[test]
    fn test_cursor_query_errors() {
        let reg = registry();
        let builder = QueryBuilder::new(&reg);
        let token = cursor::encode(&[CursorValue::Int(1)]).unwrap();
        let err = builder
            .build_cursor_query("user", &cursor_query(json!({"sort": ["age"], "cursor": token})))
            .unwrap_err();
        assert!(matches!(err, QueryError::CursorLengthMismatch { cursor: 1, sort: 2 }));

        let err = builder
            .build_cursor_query("user", &cursor_query(json!({"cursor": "%%%"})))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidCursor(_)));
    }

    #[test]
    fn test_cursor_query_limit_defaults_and_clamps() {
        let reg = registry();
        let builder = QueryBuilder::new(&reg).with_limits(QueryLimits {
            default_limit: 7,
            max_limit: 10,
        });
        let plan = builder.build_cursor_query("user", &CursorQuery::default()).unwrap();
        assert_eq!(plan.limit, 7);
        let plan = builder
            .build_cursor_query("user", &cursor_query(json!({"limit": 99})))
            .unwrap();
        assert_eq!(plan.limit, 10);
        let plan = builder
            .build_cursor_query("user", &cursor_query(json!({"limit": 0})))
            .unwrap();
        assert_eq!(plan.limit, 1);
    }

    #[test]
    fn test_cursor_query_relation_sort_projects_helper_column() {
        let reg = registry();
        let plan = QueryBuilder::new(&reg)
            .build_cursor_query("user", &cursor_query(json!({"sort": ["organization.name"]})))
            .unwrap();
        assert_eq!(plan.select.joins.len(), 1);
        assert_eq!(plan.helper_keys().collect::<Vec<_>>(), vec!["organization.name"]);
        let last = plan.select.columns.last().unwrap();
        assert_eq!(last.alias, "organization.name");
        assert_eq!(last.column, ColumnRef::new("organization", "name"));
    }

    #[test]
    fn test_aggregate_plan() {
        let reg = registry();
        let agg: AggregateQuery =
            serde_json::from_value(json!({"groupBy": ["country"], "count": ["id"]})).unwrap();
        let plan = QueryBuilder::new(&reg)
            .build_aggregate_query("user", &FilterNode::default(), &agg)
            .unwrap();
        assert_eq!(plan.columns.len(), 2);
        assert_eq!(plan.group_by(), vec![&ColumnRef::new("users", "country")]);
    }

    #[test]
    fn test_lookup_plan() {
        let reg = registry();
        let builder = QueryBuilder::new(&reg);
        let plan = builder.build_lookup("user", &json!(3)).unwrap();
        assert_eq!(plan.limit, Some(1));
        assert_eq!(
            plan.filter,
            Some(Predicate::compare(
                ColumnRef::new("users", "id"),
                CompareOp::Eq,
                SqlValue::Int(3)
            ))
        );
        assert!(builder.build_lookup("user", &json!({"id": 3})).is_ok());
        assert!(builder.build_lookup("user", &json!({"uid": 3})).is_err());
        assert!(builder.build_lookup("user", &json!([3])).is_err());
    }
}
