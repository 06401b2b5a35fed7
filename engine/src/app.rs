//! Core application

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::core::cli::{self, CliConfig, Commands, QueryKind};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, ENV_LOG};
use crate::data::sql::{render_aggregate, render_count, render_select};
use crate::data::{DataError, EntityRepository, MemoryStore, QueryStore, RepositoryError, SqliteStore};
use crate::query::aggregate::AggregateQuery;
use crate::query::filter::{FilterNode, parse_filter};
use crate::query::predicate::SqlValue;
use crate::query::types::{CursorQuery, PageQuery};
use crate::query::{ErrorKind, MetadataProvider, MetadataRegistry, QueryBuilder, QueryError};

/// A decoded `--input` document
#[derive(Debug)]
enum Request {
    Page(PageQuery),
    Cursor(CursorQuery),
    Count(FilterNode),
    Aggregate(FilterNode, AggregateQuery),
}

impl Request {
    /// The filter is parsed separately so the configured depth limit applies
    fn parse(kind: QueryKind, value: Value, max_depth: usize) -> Result<Self> {
        let Value::Object(mut map) = value else {
            anyhow::bail!("Request must be a JSON object");
        };
        let filter = map
            .remove("filter")
            .map(|f| parse_filter(&f, max_depth))
            .transpose()?
            .unwrap_or_default();
        let rest = Value::Object(map);

        Ok(match kind {
            QueryKind::Page => {
                let mut query: PageQuery =
                    serde_json::from_value(rest).context("Invalid page request")?;
                query.filter = filter;
                Request::Page(query)
            }
            QueryKind::Cursor => {
                let mut query: CursorQuery =
                    serde_json::from_value(rest).context("Invalid cursor request")?;
                query.filter = filter;
                Request::Cursor(query)
            }
            QueryKind::Count => Request::Count(filter),
            QueryKind::Aggregate => {
                let aggregate: AggregateQuery =
                    serde_json::from_value(rest).context("Invalid aggregate request")?;
                Request::Aggregate(filter, aggregate)
            }
        })
    }
}

/// Classify a command failure: request errors by kind, store errors by
/// whether a retry could succeed
fn failure_class(err: &anyhow::Error) -> &'static str {
    fn query_class(e: &QueryError) -> &'static str {
        match e.kind() {
            ErrorKind::Shape => "shape",
            ErrorKind::Reference => "reference",
            ErrorKind::Decode => "decode",
        }
    }
    fn data_class(e: &DataError) -> &'static str {
        if e.is_transient() { "transient" } else { "store" }
    }

    if let Some(e) = err.downcast_ref::<QueryError>() {
        return query_class(e);
    }
    if let Some(e) = err.downcast_ref::<DataError>() {
        return data_class(e);
    }
    match err.downcast_ref::<RepositoryError>() {
        Some(RepositoryError::Query(e)) => query_class(e),
        Some(RepositoryError::Data(e)) => data_class(e),
        None => "other",
    }
}

pub struct CoreApp {
    pub config: AppConfig,
    pub registry: Arc<MetadataRegistry>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let result = Self::run_command().await;
        if let Err(e) = &result {
            tracing::debug!(class = failure_class(e), "Command failed");
        }
        result
    }

    async fn run_command() -> Result<()> {
        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let Some(command) = command else {
            anyhow::bail!("No command given, run `{} --help` for usage", APP_NAME);
        };

        let app = Self::init(&cli_config)?;
        let output = match command {
            Commands::Compile {
                entity,
                kind,
                input,
            } => app.compile(&entity, Self::read_request(kind, &input, &app.config)?)?,
            Commands::Query {
                entity,
                kind,
                input,
            } => {
                let request = Self::read_request(kind, &input, &app.config)?;
                app.query(&entity, request).await?
            }
            Commands::Schema { entity } => app.schema(entity.as_deref())?,
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let registry = MetadataRegistry::load(&config.schema_path).with_context(|| {
            format!("Failed to load schema: {}", config.schema_path.display())
        })?;
        tracing::debug!(entities = registry.names().len(), "Schema loaded");
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        // stdout carries command output
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    fn read_request(kind: QueryKind, input: &str, config: &AppConfig) -> Result<Request> {
        let content = if input == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        } else {
            let path = Path::new(input);
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request file: {}", path.display()))?
        };
        let value: Value = if content.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&content).context("Failed to parse request JSON")?
        };
        Request::parse(kind, value, config.query.max_filter_depth)
    }

    /// Render a request for the configured dialect without executing it
    fn compile(&self, entity: &str, request: Request) -> Result<Value> {
        let dialect = self.config.query.dialect.dialect();
        let builder =
            QueryBuilder::new(self.registry.as_ref()).with_limits(self.config.query.limits());

        let rendered = match &request {
            Request::Page(query) => render_select(dialect, &builder.build_page_query(entity, query)?),
            Request::Cursor(query) => {
                render_select(dialect, &builder.build_cursor_query(entity, query)?.select)
            }
            Request::Count(filter) => render_count(dialect, &builder.build_count_query(entity, filter)?),
            Request::Aggregate(filter, aggregate) => render_aggregate(
                dialect,
                &builder.build_aggregate_query(entity, filter, aggregate)?,
            ),
        };
        tracing::debug!(entity, dialect = dialect.name(), params = rendered.params.len(), "Compiled request");

        let params: Vec<Value> = rendered.params.iter().map(SqlValue::to_json).collect();
        Ok(json!({
            "dialect": dialect.name(),
            "sql": rendered.sql,
            "params": params,
        }))
    }

    /// Execute against SQLite when a database URL is configured, else the data file
    async fn query(&self, entity: &str, request: Request) -> Result<Value> {
        if let Some(url) = &self.config.database.url {
            let store = Arc::new(
                SqliteStore::connect(url, self.config.database.max_connections)
                    .await
                    .with_context(|| format!("Failed to open database: {}", url))?,
            );
            let result = self.execute(Arc::clone(&store), entity, request).await;
            store.close().await;
            return result;
        }

        if let Some(path) = &self.config.database.data {
            let store = MemoryStore::load(path)
                .with_context(|| format!("Failed to load data file: {}", path.display()))?;
            return self.execute(Arc::new(store), entity, request).await;
        }

        anyhow::bail!("No data source configured, set --database-url or --data")
    }

    async fn execute<S: QueryStore + ?Sized>(
        &self,
        store: Arc<S>,
        entity: &str,
        request: Request,
    ) -> Result<Value> {
        let repo = EntityRepository::new(store, Arc::clone(&self.registry), entity)?
            .with_limits(self.config.query.limits());

        let output = match request {
            Request::Page(query) => serde_json::to_value(repo.query(&query).await?)?,
            Request::Cursor(query) => serde_json::to_value(repo.cursor_query(&query).await?)?,
            Request::Count(filter) => json!({ "count": repo.count(&filter).await? }),
            Request::Aggregate(filter, aggregate) => {
                serde_json::to_value(repo.aggregate(&filter, &aggregate).await?)?
            }
        };
        Ok(output)
    }

    fn schema(&self, entity: Option<&str>) -> Result<Value> {
        match entity {
            Some(name) => Ok(serde_json::to_value(self.registry.require(name)?)?),
            None => Ok(json!({ "entities": self.registry.names() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::registry;

    fn app(data: Option<std::path::PathBuf>) -> CoreApp {
        let cli = CliConfig {
            data,
            ..Default::default()
        };
        CoreApp {
            config: AppConfig::load(&cli).unwrap(),
            registry: Arc::new(registry()),
        }
    }

    #[test]
    fn test_request_parse_kinds() {
        let value = json!({"filter": {"age": {"gt": 30}}, "sort": ["-age"], "pagination": {"limit": 5}});
        let Request::Page(query) = Request::parse(QueryKind::Page, value, 8).unwrap() else {
            panic!("expected a page request");
        };
        assert_eq!(query.sort, vec!["-age"]);
        assert_eq!(query.pagination.limit, Some(5));
        assert!(!query.filter.is_match_all());

        let value = json!({"groupBy": ["country"], "count": ["id"]});
        let Request::Aggregate(filter, aggregate) =
            Request::parse(QueryKind::Aggregate, value, 8).unwrap()
        else {
            panic!("expected an aggregate request");
        };
        assert!(filter.is_match_all());
        assert_eq!(aggregate.group_by, vec!["country"]);
    }

    #[test]
    fn test_request_parse_honors_depth() {
        let value = json!({"filter": {"and": [{"and": [{"age": {"eq": 1}}]}]}});
        assert!(Request::parse(QueryKind::Count, value.clone(), 2).is_err());
        assert!(Request::parse(QueryKind::Count, value, 8).is_ok());
        assert!(Request::parse(QueryKind::Page, json!([1]), 8).is_err());
    }

    #[test]
    fn test_oversized_filter_rejected_from_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        let name = "x".repeat(64 * 1024);
        std::fs::write(&path, json!({"filter": {"name": {"eq": name}}}).to_string()).unwrap();
        let app = app(None);

        let err = CoreApp::read_request(QueryKind::Count, path.to_str().unwrap(), &app.config).unwrap_err();
        assert!(err.to_string().contains("maximum size"), "{err}");
        assert_eq!(failure_class(&err), "shape");

        std::fs::write(&path, r#"{"filter": {"name": {"eq": "alice"}}}"#).unwrap();
        assert!(CoreApp::read_request(QueryKind::Count, path.to_str().unwrap(), &app.config).is_ok());
    }

    #[tokio::test]
    async fn test_failure_class() {
        let app = app(None);
        let filter = parse_filter(&json!({"shoe_size": {"eq": 3}}), 8).unwrap();
        let err = app.compile("user", Request::Count(filter)).unwrap_err();
        assert_eq!(failure_class(&err), "reference");

        let err: anyhow::Error = RepositoryError::Query(QueryError::InvalidCursor("x".into())).into();
        assert_eq!(failure_class(&err), "decode");
        let err: anyhow::Error = RepositoryError::Data(DataError::from_sqlite(sqlx::Error::PoolTimedOut)).into();
        assert_eq!(failure_class(&err), "transient");
        let err = anyhow::Error::new(DataError::UnknownTable("ghosts".into())).context("Failed to query");
        assert_eq!(failure_class(&err), "store");

        let err = app.query("user", Request::Count(FilterNode::default())).await.unwrap_err();
        assert_eq!(failure_class(&err), "other");
    }

    #[test]
    fn test_compile_renders_sqlite() {
        let app = app(None);
        let request = Request::Count(
            parse_filter(&json!({"country": {"eq": "fr"}}), 8).unwrap(),
        );
        let out = app.compile("user", request).unwrap();
        assert_eq!(out["dialect"], json!("sqlite"));
        assert!(out["sql"].as_str().unwrap().starts_with("SELECT COUNT(*)"));
        assert_eq!(out["params"], json!(["fr"]));
    }

    #[test]
    fn test_schema_output() {
        let app = app(None);
        let all = app.schema(None).unwrap();
        assert!(all["entities"].as_array().unwrap().contains(&json!("user")));
        assert_eq!(app.schema(Some("user")).unwrap()["name"], json!("user"));
        assert!(app.schema(Some("ghost")).is_err());
    }

    #[tokio::test]
    async fn test_query_against_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"users": [
                {"id": 1, "name": "alice", "age": 31, "country": "fr"},
                {"id": 2, "name": "bob", "age": 25, "country": "de"},
                {"id": 3, "name": "carol", "age": 40, "country": "fr"}
            ]}"#,
        )
        .unwrap();
        let app = app(Some(path));

        let count = Request::Count(parse_filter(&json!({"country": {"eq": "fr"}}), 8).unwrap());
        assert_eq!(app.query("user", count).await.unwrap(), json!({"count": 2}));

        let cursor = Request::parse(QueryKind::Cursor, json!({"sort": ["age"], "limit": 2}), 8).unwrap();
        let page = app.query("user", cursor).await.unwrap();
        assert_eq!(page["rows"].as_array().unwrap().len(), 2);
        assert_eq!(page["pageInfo"]["hasNext"], json!(true));
    }

    #[tokio::test]
    async fn test_query_without_source_fails() {
        let app = app(None);
        let err = app.query("user", Request::Count(FilterNode::default())).await.unwrap_err();
        assert!(err.to_string().contains("No data source"));
    }
}
