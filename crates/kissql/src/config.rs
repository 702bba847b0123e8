//! Configuration handling for the KISSQL CLI.
//!
//! Settings are read from `config.toml` in the XDG config directory, or from
//! `$KISSQL_CONFIG_DIR` when set. Every key is optional.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kissql_query::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Query execution
    #[serde(default)]
    pub query: QueryConfig,

    /// Local embedding
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Result cap when the query has no `limit:`
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum result limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Semantic candidates fetched per result slot
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Fields searched by text terms and phrases
    #[serde(default = "default_text_fields")]
    pub text_fields: Vec<String>,

    /// Per-branch deadline (ms)
    #[serde(default)]
    pub branch_timeout_ms: Option<u64>,
}

fn default_limit() -> usize {
    100
}

fn default_max_limit() -> usize {
    1000
}

fn default_overfetch_factor() -> usize {
    4
}

fn default_text_fields() -> Vec<String> {
    vec![
        "title".to_string(),
        "summary".to_string(),
        "content".to_string(),
    ]
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            overfetch_factor: default_overfetch_factor(),
            text_fields: default_text_fields(),
            branch_timeout_ms: None,
        }
    }
}

/// Embedding-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Width of the hashed feature vectors
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_dimension() -> usize {
    kissql_embed::DEFAULT_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("Invalid TOML in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the default config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// A commented config file with every default spelled out.
    pub fn sample_toml() -> String {
        let defaults = QueryConfig::default();
        format!(
            r#"# KISSQL configuration

[query]
# Results returned when a query has no limit: directive
default_limit = {default_limit}
# Hard cap applied to every query, including an explicit limit:
max_limit = {max_limit}
# Semantic candidates fetched per result slot
overfetch_factor = {overfetch}
# Fields searched by text terms and phrases
text_fields = [{fields}]
# Per-branch deadline in milliseconds (unset: no deadline)
# branch_timeout_ms = 2000

[embedding]
dimension = {dimension}

[logging]
# trace, debug, info, warn or error
level = "info"
"#,
            default_limit = defaults.default_limit,
            max_limit = defaults.max_limit,
            overfetch = defaults.overfetch_factor,
            fields = defaults
                .text_fields
                .iter()
                .map(|f| format!("\"{f}\""))
                .collect::<Vec<_>>()
                .join(", "),
            dimension = default_dimension(),
        )
    }

    /// Executor settings derived from `[query]`.
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_limit: self.query.default_limit,
            max_limit: self.query.max_limit,
            overfetch_factor: self.query.overfetch_factor,
            text_fields: self.query.text_fields.clone(),
            branch_timeout: self.query.branch_timeout_ms.map(Duration::from_millis),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.query.overfetch_factor == 0 {
            anyhow::bail!("query.overfetch_factor must be at least 1");
        }
        if self.query.default_limit > self.query.max_limit {
            anyhow::bail!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                self.query.default_limit,
                self.query.max_limit
            );
        }
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be at least 1");
        }
        Ok(())
    }
}

/// Get the XDG config directory for KISSQL.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("KISSQL_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "kissql").map(|dirs| dirs.config_dir().to_path_buf())
}
