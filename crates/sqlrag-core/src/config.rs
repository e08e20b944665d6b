//! Configuration types for the text-to-SQL pipeline.
//!
//! The configuration is built once at process start and handed to every
//! component that talks to the database, the model services, or the vector
//! index. Nothing below the CLI reads the environment directly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SqlRagError};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlRagConfig {
    /// Source database connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding and text generation services.
    #[serde(default)]
    pub models: ModelConfig,

    /// Persistent vector index.
    #[serde(default)]
    pub index: IndexConfig,

    /// Query pipeline settings.
    #[serde(default)]
    pub query: QueryConfig,
}

/// Source database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// User name.
    #[serde(default = "default_db_user")]
    pub user: String,

    /// Password (empty for none).
    #[serde(default)]
    pub password: String,

    /// Database (schema) name. Also scopes foreign key introspection.
    #[serde(default = "default_db_name")]
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
        }
    }
}

/// Embedding and chat model service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the model server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Embedding model identifier. Must match between indexing and querying.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Chat model identifier used for SQL and answer synthesis.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Request timeout in seconds. None waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: None,
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Path to the index file.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,

    /// Collection holding one record per table.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
        }
    }
}

/// Query pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of schema documents retrieved per question.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Row cap the model is asked to apply unless the question wants more.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,

    /// SQL dialect named in the prompt.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Reject generated statements that are not read-only.
    #[serde(default = "default_true")]
    pub read_only: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            row_limit: default_row_limit(),
            dialect: default_dialect(),
            read_only: true,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "root".to_string()
}

fn default_db_name() -> String {
    "northwind".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_chat_model() -> String {
    "llama3.2".to_string()
}

fn default_index_path() -> PathBuf {
    PathBuf::from("schema_index").join("index.sqlite")
}

fn default_collection() -> String {
    "northwind_schema".to_string()
}

fn default_top_n() -> usize {
    5
}

fn default_row_limit() -> usize {
    20
}

fn default_dialect() -> String {
    "MySQL".to_string()
}

impl SqlRagConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SqlRagError::config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sqlrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("sqlrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Load from `path` (or the default locations), then apply `.env` and
    /// process environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };

        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` and
    /// `OLLAMA_HOST` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port
                .parse()
                .map_err(|_| SqlRagError::config(format!("DB_PORT is not a port: {}", port)))?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        if let Some(base_url) = lookup("OLLAMA_HOST") {
            self.models.base_url = base_url;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.query.top_n == 0 {
            return Err(SqlRagError::config("query.top_n must be at least 1"));
        }
        if self.query.row_limit == 0 {
            return Err(SqlRagError::config("query.row_limit must be at least 1"));
        }
        if self.index.collection.trim().is_empty() {
            return Err(SqlRagError::config("index.collection must not be empty"));
        }
        if self.database.name.trim().is_empty() {
            return Err(SqlRagError::config("database.name must not be empty"));
        }
        Ok(())
    }
}
