use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use super::constants::{ENV_CONFIG, ENV_DATA_FILE, ENV_DATABASE_URL, ENV_DIALECT, ENV_SCHEMA};
use crate::data::sql::Backend;

#[derive(Parser)]
#[command(name = "sift")]
#[command(version, about = "Compile JSON filter, sort and aggregate requests into SQL", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Entity schema file (JSON)
    #[arg(long, short = 's', global = true, env = ENV_SCHEMA)]
    pub schema: Option<PathBuf>,

    /// SQL dialect for `compile` (sqlite, postgres)
    #[arg(long, global = true, env = ENV_DIALECT, value_parser = parse_dialect)]
    pub dialect: Option<Backend>,

    /// SQLite database URL for `query`
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// JSON data file (`{"table": [rows]}`) queried in memory when no database is set
    #[arg(long, global = true, env = ENV_DATA_FILE)]
    pub data: Option<PathBuf>,

    /// Maximum rows per page
    #[arg(long, global = true)]
    pub max_limit: Option<u64>,
}

/// Parse SQL dialect from CLI/env string
fn parse_dialect(s: &str) -> Result<Backend, String> {
    s.parse()
}

/// Request shape read from `--input`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    /// `{filter, sort, pagination}`
    Page,
    /// `{filter, sort, limit, direction, cursor}`
    Cursor,
    /// `{filter}`
    Count,
    /// `{filter, groupBy, count, sum, avg, max, min}`
    Aggregate,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Compile a request and print the SQL with its bound parameters
    Compile {
        /// Entity the request targets
        #[arg(long, short = 'e')]
        entity: String,
        #[arg(long, short = 'k', value_enum, default_value = "page")]
        kind: QueryKind,
        /// Request file; `-` reads stdin
        #[arg(long, short = 'i', default_value = "-")]
        input: String,
    },
    /// Execute a request and print the result as JSON
    Query {
        #[arg(long, short = 'e')]
        entity: String,
        #[arg(long, short = 'k', value_enum, default_value = "page")]
        kind: QueryKind,
        #[arg(long, short = 'i', default_value = "-")]
        input: String,
    },
    /// Print entity metadata
    Schema {
        /// Only this entity; all entity names otherwise
        #[arg(long, short = 'e')]
        entity: Option<String>,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub schema: Option<PathBuf>,
    pub dialect: Option<Backend>,
    pub database_url: Option<String>,
    pub data: Option<PathBuf>,
    pub max_limit: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        schema: cli.schema,
        dialect: cli.dialect,
        database_url: cli.database_url,
        data: cli.data,
        max_limit: cli.max_limit,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_command() {
        let cli = Cli::try_parse_from([
            "sift", "--dialect", "postgres", "compile", "-e", "user", "-k", "cursor", "-i",
            "req.json",
        ])
        .unwrap();
        assert_eq!(cli.dialect, Some(Backend::Postgres));
        match cli.command {
            Some(Commands::Compile { entity, kind, input }) => {
                assert_eq!(entity, "user");
                assert_eq!(kind, QueryKind::Cursor);
                assert_eq!(input, "req.json");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from(["sift", "schema", "--schema", "s.json", "--max-limit", "10"])
            .unwrap();
        assert_eq!(cli.schema, Some(PathBuf::from("s.json")));
        assert_eq!(cli.max_limit, Some(10));
        assert!(matches!(cli.command, Some(Commands::Schema { entity: None })));
    }

    #[test]
    fn test_invalid_dialect_rejected() {
        assert!(Cli::try_parse_from(["sift", "--dialect", "oracle", "schema"]).is_err());
    }

    #[test]
    fn test_query_defaults() {
        let cli = Cli::try_parse_from(["sift", "query", "-e", "user"]).unwrap();
        match cli.command {
            Some(Commands::Query { kind, input, .. }) => {
                assert_eq!(kind, QueryKind::Page);
                assert_eq!(input, "-");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
