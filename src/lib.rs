//! Graph OGM
//!
//! Maps strongly-typed Rust object graphs onto a Neo4j property graph:
//! - Metadata registry parsed once from per-field tag declarations
//! - Write planner and UNWIND batch persistence for saves
//! - Parallel read reconstruction of linked object graphs from load results
//! - Schema reconciliation of constraints and indexes against the registry

pub mod cypher;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod neo4j;
pub mod persist;
pub mod planner;
pub mod reconstruct;
pub mod schema;
pub mod session;
pub mod value;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use entity::{shared, EdgeEntity, Entity, EntityRef, Mapped, Shared, TypeKey};
pub use error::{ErrorCategory, OgmError};
pub use metadata::{FieldDecl, PrimaryKeyStrategy, Registry, RegistryBuilder};
pub use schema::IndexStrategy;
pub use session::{Ogm, Session, SessionOptions};
pub use value::{FromValue, Value};

use anyhow::{Context, Result};
use neo4j::ConnectionSettings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub neo4j: Neo4jYamlConfig,
    pub mapping: MappingYamlConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Logical databases to target; empty means the server default.
    pub databases: Vec<String>,
    pub max_connections: usize,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "password".into(),
            databases: Vec::new(),
            max_connections: 16,
        }
    }
}

/// Mapping behaviour section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingYamlConfig {
    /// `uuid` or `native`
    pub primary_key: String,
    pub index_strategy: IndexStrategy,
    pub default_depth: usize,
    pub query_timeout_secs: u64,
}

impl Default for MappingYamlConfig {
    fn default() -> Self {
        Self {
            primary_key: metadata::UUID_STRATEGY.into(),
            index_strategy: IndexStrategy::Ignore,
            default_depth: 1,
            query_timeout_secs: 30,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_databases: Vec<String>,
    pub neo4j_max_connections: usize,
    pub primary_key: PrimaryKeyStrategy,
    pub index_strategy: IndexStrategy,
    pub default_depth: usize,
    pub query_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "ogm.yaml" in CWD and falls back to
    /// defaults when it does not exist. An explicit path must exist and parse.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        Self::from_sources(yaml_path, |key| std::env::var(key).ok())
    }

    fn from_sources(
        yaml_path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path)?;

        let databases = match env("NEO4J_DATABASES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => yaml.neo4j.databases,
        };
        let primary_key_name = env("OGM_PRIMARY_KEY").unwrap_or(yaml.mapping.primary_key);
        let primary_key = PrimaryKeyStrategy::from_name(&primary_key_name)
            .context("Invalid mapping.primary_key")?;
        let index_strategy = match env("OGM_INDEX_STRATEGY") {
            Some(s) => s
                .parse::<IndexStrategy>()
                .context("Invalid OGM_INDEX_STRATEGY")?,
            None => yaml.mapping.index_strategy,
        };
        let default_depth = parse_env(&env, "OGM_DEFAULT_DEPTH")?
            .unwrap_or(yaml.mapping.default_depth);
        planner::check_depth(default_depth).context("Invalid mapping.default_depth")?;
        let timeout_secs = parse_env(&env, "OGM_QUERY_TIMEOUT_SECS")?
            .unwrap_or(yaml.mapping.query_timeout_secs);

        Ok(Self {
            neo4j_uri: env("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: env("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: env("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            neo4j_databases: databases,
            neo4j_max_connections: parse_env(&env, "NEO4J_MAX_CONNECTIONS")?
                .unwrap_or(yaml.neo4j.max_connections),
            primary_key,
            index_strategy,
            default_depth,
            query_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn load_yaml(yaml_path: Option<&Path>) -> Result<YamlConfig> {
        let path = match yaml_path {
            Some(path) => path,
            None => {
                let default_path = Path::new("ogm.yaml");
                if !default_path.exists() {
                    tracing::debug!("No config file at ogm.yaml, using env vars / defaults");
                    return Ok(YamlConfig::default());
                }
                default_path
            }
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// One connection per configured database, or one for the server default.
    pub fn connection_settings(&self) -> Vec<ConnectionSettings> {
        let settings = |database: Option<String>| ConnectionSettings {
            uri: self.neo4j_uri.clone(),
            user: self.neo4j_user.clone(),
            password: self.neo4j_password.clone(),
            database,
            max_connections: self.neo4j_max_connections,
        };
        if self.neo4j_databases.is_empty() {
            vec![settings(None)]
        } else {
            self.neo4j_databases
                .iter()
                .map(|db| settings(Some(db.clone())))
                .collect()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            default_depth: self.default_depth,
            query_timeout: self.query_timeout,
        }
    }

    /// Registry builder for the configured key strategy.
    pub fn registry_builder(&self) -> RegistryBuilder {
        RegistryBuilder::new(self.primary_key.clone())
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("Invalid {}", key))
}

// ============================================================================
// Tests
// ============================================================================
