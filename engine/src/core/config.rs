use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_FILTER_DEPTH, DEFAULT_QUERY_LIMIT,
    DEFAULT_SCHEMA_FILE, MAX_QUERY_LIMIT,
};
use crate::data::sql::Backend;
use crate::query::QueryLimits;
use crate::utils::file::expand_path;

// =============================================================================
// File configuration (JSON)
// =============================================================================

/// Database configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    /// In-memory data file used when no url is set
    pub data: Option<String>,
}

/// Query compiler configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryFileConfig {
    pub dialect: Option<Backend>,
    pub default_limit: Option<u64>,
    pub max_limit: Option<u64>,
    pub max_filter_depth: Option<usize>,
}

/// Schema configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SchemaFileConfig {
    pub path: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub query: Option<QueryFileConfig>,
    pub schema: Option<SchemaFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub data: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub dialect: Backend,
    pub default_limit: u64,
    pub max_limit: u64,
    pub max_filter_depth: usize,
}

impl QueryConfig {
    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub schema_path: PathBuf,
}

impl AppConfig {
    /// Layer defaults, the config file and CLI/env overrides
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        // 1. Explicit --config must exist; otherwise the local file is optional
        let path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        let file_config = match path {
            Some(path) => {
                let config = FileConfig::load_from_file(&path)?;
                config.warn_unknown_fields();
                config
            }
            None => FileConfig::default(),
        };

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        tracing::debug!(
            dialect = %config.query.dialect,
            schema = %config.schema_path.display(),
            database = config.database.url.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file: FileConfig) -> Self {
        let file_database = file.database.unwrap_or_default();
        let file_query = file.query.unwrap_or_default();
        let file_schema = file.schema.unwrap_or_default();

        let database = DatabaseConfig {
            url: cli.database_url.clone().or(file_database.url),
            max_connections: file_database
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            data: cli
                .data
                .clone()
                .or_else(|| file_database.data.as_deref().map(expand_path)),
        };

        let query = QueryConfig {
            dialect: cli.dialect.or(file_query.dialect).unwrap_or_default(),
            default_limit: file_query.default_limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            max_limit: cli
                .max_limit
                .or(file_query.max_limit)
                .unwrap_or(MAX_QUERY_LIMIT),
            max_filter_depth: file_query
                .max_filter_depth
                .unwrap_or(DEFAULT_MAX_FILTER_DEPTH),
        };

        let schema_path = cli
            .schema
            .clone()
            .or_else(|| file_schema.path.as_deref().map(expand_path))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILE));

        Self {
            database,
            query,
            schema_path,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.query.max_limit == 0 {
            anyhow::bail!("Configuration error: query.max_limit must be greater than 0");
        }
        if self.query.default_limit == 0 {
            anyhow::bail!("Configuration error: query.default_limit must be greater than 0");
        }
        if self.query.default_limit > self.query.max_limit {
            anyhow::bail!(
                "Configuration error: query.default_limit ({}) cannot exceed query.max_limit ({})",
                self.query.default_limit,
                self.query.max_limit
            );
        }
        if self.query.max_filter_depth == 0 {
            anyhow::bail!("Configuration error: query.max_filter_depth must be greater than 0");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Configuration error: database.max_connections must be greater than 0");
        }
        if self
            .database
            .url
            .as_ref()
            .is_some_and(|url| url.trim().is_empty())
        {
            anyhow::bail!("Configuration error: database.url must not be empty when set");
        }
        Ok(())
    }
}
