//! Plan to SQL rendering
//!
//! Operands are never inlined: every value becomes a placeholder and is
//! collected, in placeholder order, into the rendered query's params.

use serde::Serialize;

use super::SqlDialect;
use crate::query::aggregate::AggregateFunc;
use crate::query::plan::{AggregatePlan, CountPlan, OrderTerm, SelectPlan};
use crate::query::predicate::{ColumnRef, CompareOp, Predicate, SqlValue};
use crate::query::relation::JoinSpec;

/// SQL text plus positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedQuery {
    pub sql: String,
    #[serde(serialize_with = "serialize_params")]
    pub params: Vec<SqlValue>,
}

fn serialize_params<S: serde::Serializer>(params: &[SqlValue], s: S) -> Result<S::Ok, S::Error> {
    let values: Vec<serde_json::Value> = params.iter().map(SqlValue::to_json).collect();
    values.serialize(s)
}

pub fn render_select(dialect: &dyn SqlDialect, plan: &SelectPlan) -> RenderedQuery {
    let mut r = Renderer::new(dialect);
    let columns: Vec<String> = plan
        .columns
        .iter()
        .map(|p| format!("{} AS {}", r.column(&p.column), dialect.quote(&p.alias)))
        .collect();

    let mut sql = format!(
        "SELECT {}{} FROM {}",
        if plan.distinct { "DISTINCT " } else { "" },
        columns.join(", "),
        dialect.quote(&plan.table)
    );
    r.push_joins(&mut sql, &plan.joins);
    r.push_where(&mut sql, plan.filter.as_ref());
    if !plan.order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&r.order(&plan.order));
    }
    let window = dialect.limit_offset(plan.limit, plan.offset);
    if !window.is_empty() {
        sql.push(' ');
        sql.push_str(&window);
    }
    r.finish(sql)
}

/// Count rows; fanned-out joins count distinct primary keys through a subquery
pub fn render_count(dialect: &dyn SqlDialect, plan: &CountPlan) -> RenderedQuery {
    let mut r = Renderer::new(dialect);
    let mut inner = if plan.distinct {
        let keys: Vec<String> = plan.key_columns.iter().map(|c| r.column(c)).collect();
        format!(
            "SELECT DISTINCT {} FROM {}",
            keys.join(", "),
            dialect.quote(&plan.table)
        )
    } else {
        format!("SELECT COUNT(*) AS \"count\" FROM {}", dialect.quote(&plan.table))
    };
    r.push_joins(&mut inner, &plan.joins);
    r.push_where(&mut inner, plan.filter.as_ref());

    let sql = if plan.distinct {
        format!("SELECT COUNT(*) AS \"count\" FROM ({}) AS \"matched\"", inner)
    } else {
        inner
    };
    r.finish(sql)
}

pub fn render_aggregate(dialect: &dyn SqlDialect, plan: &AggregatePlan) -> RenderedQuery {
    let mut r = Renderer::new(dialect);
    let columns: Vec<String> = plan
        .columns
        .iter()
        .map(|c| {
            let col = r.column(&c.column);
            let expr = match c.func {
                AggregateFunc::GroupBy => col,
                func => format!("{}({})", func.prefix(), col),
            };
            format!("{} AS {}", expr, dialect.quote(&c.alias))
        })
        .collect();

    let mut sql = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        dialect.quote(&plan.table)
    );
    r.push_joins(&mut sql, &plan.joins);
    r.push_where(&mut sql, plan.filter.as_ref());

    let group_by: Vec<String> = plan.group_by().into_iter().map(|c| r.column(c)).collect();
    if !group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by.join(", "));
    }
    r.finish(sql)
}

struct Renderer<'d> {
    dialect: &'d dyn SqlDialect,
    params: Vec<SqlValue>,
}

impl<'d> Renderer<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn finish(self, sql: String) -> RenderedQuery {
        tracing::trace!(dialect = self.dialect.name(), %sql, params = self.params.len(), "Rendered SQL");
        RenderedQuery {
            sql,
            params: self.params,
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn column(&self, column: &ColumnRef) -> String {
        match &column.qualifier {
            Some(q) => format!("{}.{}", self.dialect.quote(q), self.dialect.quote(&column.name)),
            None => self.dialect.quote(&column.name),
        }
    }

    fn push_joins(&self, sql: &mut String, joins: &[JoinSpec]) {
        for join in joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
                self.dialect.quote(&join.table),
                self.dialect.quote(&join.alias),
                self.dialect.quote(&join.parent_alias),
                self.dialect.quote(&join.local_column),
                self.dialect.quote(&join.alias),
                self.dialect.quote(&join.foreign_column),
            ));
        }
    }

    fn push_where(&mut self, sql: &mut String, filter: Option<&Predicate>) {
        let Some(filter) = filter.filter(|f| !f.is_trivial()) else {
            return;
        };
        let clause = self.predicate(filter);
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }

    fn order(&self, order: &[OrderTerm]) -> String {
        order
            .iter()
            .map(|o| {
                let col = self.column(&o.column);
                format!(
                    "{} {}{}",
                    if o.temporal { self.dialect.temporal(&col) } else { col },
                    if o.descending { "DESC" } else { "ASC" },
                    self.dialect.nulls_order(o.descending)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Compare { column, op, value } => {
                let col = self.column(column);
                match (op, value) {
                    (CompareOp::Eq, SqlValue::Null) => format!("{} IS NULL", col),
                    (CompareOp::Neq, SqlValue::Null) => format!("{} IS NOT NULL", col),
                    (_, SqlValue::Timestamp(_)) => {
                        let ph = self.bind(value.clone());
                        format!(
                            "{} {} {}",
                            self.dialect.temporal(&col),
                            op.as_sql(),
                            self.dialect.temporal(&ph)
                        )
                    }
                    _ => {
                        let ph = self.bind(value.clone());
                        format!("{} {} {}", col, op.as_sql(), ph)
                    }
                }
            }
            Predicate::Like {
                column,
                pattern,
                case_insensitive,
            } => {
                let col = self.column(column);
                if !*case_insensitive
                    && let Some(glob) = self.dialect.case_sensitive_glob(pattern)
                {
                    let ph = self.bind(SqlValue::Text(glob));
                    return format!("{} GLOB {}", col, ph);
                }
                let ph = self.bind(SqlValue::Text(pattern.clone()));
                self.dialect.like(&col, &ph, *case_insensitive)
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    return "1 = 0".to_string();
                }
                let col = self.column(column);
                let phs: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
                format!("{} IN ({})", col, phs.join(", "))
            }
            Predicate::Not(inner) => match inner.as_ref() {
                Predicate::In { values, .. } if values.is_empty() => "1 = 1".to_string(),
                inner => format!("NOT ({})", self.predicate(inner)),
            },
            Predicate::And(parts) => self.group(parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => self.group(parts, " OR ", "1 = 0"),
        }
    }

    fn group(&mut self, parts: &[Predicate], sep: &str, empty: &str) -> String {
        match parts {
            [] => empty.to_string(),
            [single] => self.predicate(single),
            parts => {
                let rendered: Vec<String> = parts.iter().map(|p| self.predicate(p)).collect();
                format!("({})", rendered.join(sep))
            }
        }
    }
}
