//! treeql configuration.
//!
//! ```toml
//! # treeql.toml
//! database_url = "sqlite://todo.db"
//! schema = "schema.toml"
//! ```
//!
//! Looked up in the working directory, then in the user config directory
//! (`~/.config/treeql/treeql.toml` on Linux). A relative `schema` path is
//! resolved against the directory of the file that names it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{TreeqlError, TreeqlResult};

pub const CONFIG_FILE: &str = "treeql.toml";

/// Environment variable that overrides `database_url`.
pub const DATABASE_URL_ENV: &str = "TREEQL_DATABASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: Option<String>,

    /// Path to the schema registry file
    pub schema: Option<PathBuf>,
}

impl Config {
    /// Load the first config file found, or defaults when there is none.
    pub fn load() -> TreeqlResult<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                tracing::debug!("using config {}", path.display());
                return Self::from_path(&path);
            }
        }
        tracing::debug!("no {} found, using defaults", CONFIG_FILE);
        Ok(Self::default())
    }

    /// Candidate locations in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("treeql").join(CONFIG_FILE));
        }
        paths
    }

    pub fn from_path(path: &Path) -> TreeqlResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let (Some(schema), Some(dir)) = (&config.schema, path.parent()) {
            if schema.is_relative() {
                config.schema = Some(dir.join(schema));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> TreeqlResult<Self> {
        toml::from_str(content)
            .map_err(|e| TreeqlError::Config(format!("failed to parse {}: {}", CONFIG_FILE, e)))
    }

    /// Apply `TREEQL_DATABASE_URL` if set.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                self.database_url = Some(url);
            }
        }
        self
    }

    pub fn database_url(&self) -> TreeqlResult<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            TreeqlError::Config(format!(
                "no database URL; set database_url in {} or {}",
                CONFIG_FILE, DATABASE_URL_ENV
            ))
        })
    }

    pub fn schema_path(&self) -> TreeqlResult<&Path> {
        self.schema.as_deref().ok_or_else(|| {
            TreeqlError::Config(format!("no schema file; set schema in {}", CONFIG_FILE))
        })
    }
}
