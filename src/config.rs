//! Configuration
//!
//! Loaded from JSON, with environment overrides for the two settings that
//! usually differ between machines:
//!
//! - `ALCHEMY_DB_PATH`: database file (`:memory:` selects an in-memory store)
//! - `ALCHEMY_LOG`: tracing filter directive

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "alchemy_experiments.db";

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "ALCHEMY_DB_PATH";

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "ALCHEMY_LOG";

/// Where the experiment store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLocation {
    /// SQLite database file
    File(PathBuf),
    /// Private in-memory database
    Memory,
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self::File(PathBuf::from(DEFAULT_DB_NAME))
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store location
    pub database: StoreLocation,
    /// Page size for run listings
    pub list_limit: usize,
    /// Default tracing filter
    pub log_filter: String,
    /// Step budget used when a form omits it
    pub default_step_budget: u64,
    /// Sample interval used when a form omits it
    pub default_sample_interval: u64,
    /// Seed used when a form omits it
    pub default_seed: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: StoreLocation::default(),
            list_limit: 50,
            log_filter: "info".to_string(),
            default_step_budget: 1000,
            default_sample_interval: 10,
            default_seed: 42,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Apply `ALCHEMY_DB_PATH` and `ALCHEMY_LOG` from the environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(DB_PATH_ENV).ok(),
            std::env::var(LOG_ENV).ok(),
        )
    }

    fn with_overrides(mut self, db_path: Option<String>, log_filter: Option<String>) -> Self {
        if let Some(path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.database = if path == ":memory:" {
                StoreLocation::Memory
            } else {
                StoreLocation::File(PathBuf::from(path))
            };
        }
        if let Some(filter) = log_filter.filter(|f| !f.trim().is_empty()) {
            self.log_filter = filter;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database, StoreLocation::File(DEFAULT_DB_NAME.into()));
        assert_eq!(config.list_limit, 50);
        assert_eq!(config.default_sample_interval, 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(r#"{"list_limit": 5, "database": "memory"}"#).unwrap();
        assert_eq!(config.list_limit, 5);
        assert_eq!(config.database, StoreLocation::Memory);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_file_location_json() {
        let config = Config::from_json_str(r#"{"database": {"file": "runs.db"}}"#).unwrap();
        assert_eq!(config.database, StoreLocation::File("runs.db".into()));
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().with_overrides(Some(":memory:".into()), Some("debug".into()));
        assert_eq!(config.database, StoreLocation::Memory);
        assert_eq!(config.log_filter, "debug");

        let config = Config::default().with_overrides(Some("  ".into()), None);
        assert_eq!(config.database, StoreLocation::default());
    }
}
