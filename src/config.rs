use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::graph::{RelationshipKey, TargetPropertySource, VisualizationOptions};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub reportgraph: ReportGraphConfig,
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportGraphConfig {
    /// SQLite database holding reports and extracted entities.
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Graph store connection
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Defaults for each visualization run; callers may override per request.
#[derive(Debug, Clone, Deserialize)]
pub struct VisualizationConfig {
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default)]
    pub include_types: Option<Vec<String>>,
    #[serde(default)]
    pub target_properties: TargetPropertySource,
    #[serde(default)]
    pub relationship_key: RelationshipKey,
    #[serde(default = "default_persist_entities")]
    pub persist_entities: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
            query_timeout_ms: default_query_timeout_ms(),
            include_types: None,
            target_properties: TargetPropertySource::default(),
            relationship_key: RelationshipKey::default(),
            persist_entities: default_persist_entities(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

pub const MAX_ROW_LIMIT: usize = 5000;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_password_env() -> String {
    "NEO4J_PASSWORD".to_string()
}

fn default_fetch_size() -> usize {
    500
}

fn default_max_connections() -> usize {
    10
}

fn default_row_limit() -> usize {
    500
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_persist_entities() -> bool {
    true
}

fn default_http_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in REPORTGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("REPORTGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let vis = &self.visualization;
        if vis.row_limit == 0 || vis.row_limit > MAX_ROW_LIMIT {
            anyhow::bail!(
                "visualization.row_limit must be between 1 and {}, got {}",
                MAX_ROW_LIMIT,
                vis.row_limit
            );
        }

        if vis.query_timeout_ms == 0 {
            anyhow::bail!("visualization.query_timeout_ms must be greater than 0");
        }

        if let Some(types) = &vis.include_types {
            if types.iter().any(|t| t.trim().is_empty()) {
                anyhow::bail!("visualization.include_types must not contain empty names");
            }
        }

        if self.neo4j.uri.trim().is_empty() {
            anyhow::bail!("neo4j.uri must not be empty");
        }

        if self.neo4j.max_connections == 0 {
            anyhow::bail!("neo4j.max_connections must be greater than 0");
        }

        Ok(())
    }

    /// Graph store password, read from the configured environment variable.
    pub fn neo4j_password(&self) -> Result<String> {
        std::env::var(&self.neo4j.password_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.neo4j.password_env
            )
        })
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.reportgraph.db_path
    }

    /// Default per-invocation options derived from `[visualization]`.
    pub fn visualization_options(&self) -> VisualizationOptions {
        let vis = &self.visualization;
        VisualizationOptions {
            row_limit: vis.row_limit,
            include_types: vis.include_types.clone(),
            target_properties: vis.target_properties,
            relationship_key: vis.relationship_key,
            timeout_ms: vis.query_timeout_ms,
            persist_entities: vis.persist_entities,
        }
    }
}
