//! relq configuration.
//!
//! Read from `relq.toml` in the working directory, or from
//! `<config dir>/relq/config.toml` when there is none:
//!
//! ```toml
//! dialect = "postgres"
//! database_url = "postgres://localhost/app"
//! catalog = "schema.toml"
//! insert_keys = false
//! audit_columns = ["created_at", "updated_at"]
//!
//! [pagination]
//! default_per_page = 25
//! max_per_page = 100
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dialect::Dialect;
use crate::error::ConfigError;
use crate::schema::Settings;

const FILE_NAME: &str = "relq.toml";

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dialect: Dialect,

    /// Database connection URL, used by `relq run`
    pub database_url: Option<String>,

    /// Path to a table catalog (see [`crate::catalog`])
    pub catalog: Option<PathBuf>,

    /// Write caller-supplied primary keys on INSERT
    pub insert_keys: bool,

    /// Columns left to the database on INSERT
    pub audit_columns: Vec<String>,

    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_per_page: u64,
    pub max_per_page: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            dialect: Dialect::default(),
            database_url: None,
            catalog: None,
            insert_keys: settings.insert_keys,
            audit_columns: settings.audit_columns,
            pagination: PaginationConfig::default(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            default_per_page: settings.default_per_page,
            max_per_page: settings.max_per_page,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one the default locations are
    /// searched, and if neither exists the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(found) => Self::from_file(&found),
            None => {
                tracing::debug!("no relq.toml found; using defaults");
                Ok(Self::default())
            }
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("relq").join("config.toml"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        tracing::info!(path = %path.display(), dialect = ?config.dialect, "loaded configuration");
        Ok(config)
    }

    /// Parse TOML text; `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: origin.to_string(),
            source,
        })
    }

    /// Registry settings derived from this configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            insert_keys: self.insert_keys,
            audit_columns: self.audit_columns.clone(),
            default_per_page: self.pagination.default_per_page,
            max_per_page: self.pagination.max_per_page,
        }
    }
}
