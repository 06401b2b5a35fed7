// =============================================================================
// Application Identity
// =============================================================================

/// Application name (binary, log target, config file stem)
pub const APP_NAME: &str = "sift";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "sift.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SIFT_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SIFT_LOG";

/// Environment variable for the entity schema file
pub const ENV_SCHEMA: &str = "SIFT_SCHEMA";

/// Environment variable for the SQL dialect used by `compile`
pub const ENV_DIALECT: &str = "SIFT_DIALECT";

/// Environment variable for the database URL
pub const ENV_DATABASE_URL: &str = "SIFT_DATABASE_URL";

/// Environment variable for an in-memory data file (`{"table": [rows]}`)
pub const ENV_DATA_FILE: &str = "SIFT_DATA";

// =============================================================================
// Query Defaults
// =============================================================================

/// Rows per cursor page when the request gives no limit
pub const DEFAULT_QUERY_LIMIT: u64 = 50;

/// Upper bound for any requested limit
pub const MAX_QUERY_LIMIT: u64 = 1000;

/// Maximum nesting depth of a filter document
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 32;

// =============================================================================
// Database Defaults
// =============================================================================

/// Default schema file name
pub const DEFAULT_SCHEMA_FILE: &str = "schema.json";

/// Maximum SQLite pool connections
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
