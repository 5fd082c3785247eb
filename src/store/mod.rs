//! Experiment Store - SQLite persistence for runs, snapshots and metrics
//!
//! Three tables back the data model:
//!
//! - `runs`: one row per run configuration; owns the run id.
//! - `snapshots`: one row per distinct expression at a sampled step.
//! - `metrics`: one row per sampled step with entropy and unique count.
//!
//! Rows are append-only. The only update the store performs is renaming a
//! run. Each single-row insert or update is atomic; multi-step writes that
//! must land together go through a savepoint (see `atomically`).

mod metrics;
mod runs;
mod snapshots;

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::{Config, StoreLocation};
use crate::Result;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    run_id              INTEGER PRIMARY KEY,
    seed                INTEGER NOT NULL,
    generator_type      TEXT    NOT NULL,
    step_budget         INTEGER NOT NULL CHECK (step_budget > 0),
    sample_interval     INTEGER NOT NULL CHECK (sample_interval > 0),
    generator_params    TEXT    NOT NULL DEFAULT '{}',
    freevar_probability REAL,
    display_name        TEXT    NOT NULL CHECK (length(trim(display_name)) > 0),
    created_at          TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs (created_at);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      INTEGER NOT NULL REFERENCES runs (run_id),
    step_index  INTEGER NOT NULL CHECK (step_index >= 0),
    expression  TEXT    NOT NULL,
    count       INTEGER NOT NULL CHECK (count > 0),
    UNIQUE (run_id, step_index, expression)
);

CREATE TABLE IF NOT EXISTS metrics (
    metric_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       INTEGER NOT NULL REFERENCES runs (run_id),
    step_index   INTEGER NOT NULL CHECK (step_index >= 0),
    entropy      REAL    NOT NULL,
    unique_count INTEGER NOT NULL CHECK (unique_count >= 0),
    UNIQUE (run_id, step_index)
);
";

/// SQLite-backed store for experiment tracking data.
///
/// ## Design
///
/// A single connection serves all three tables. Reads return owned records
/// so callers never hold a statement open.
///
/// ## Time-Series Ordering
///
/// Metric reads come back ascending by step, snapshot reads descending by
/// count with insertion order breaking ties.
#[derive(Debug)]
pub struct ExperimentStore {
    conn: Connection,
}

impl ExperimentStore {
    /// Create a builder for opening a store.
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Open (or create) a store backed by a database file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened experiment database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory store. Data is lost when the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Check if the store holds no runs, snapshots or metrics.
    ///
    /// # Errors
    ///
    /// Returns error if the count queries fail.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.run_count()? == 0 && self.snapshot_row_count()? == 0 && self.metric_count()? == 0)
    }

    /// Get the number of runs in the store.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn run_count(&self) -> Result<u64> {
        self.count_rows("SELECT COUNT(*) FROM runs")
    }

    /// Get the number of snapshot rows in the store.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn snapshot_row_count(&self) -> Result<u64> {
        self.count_rows("SELECT COUNT(*) FROM snapshots")
    }

    /// Get the number of metric rows in the store.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn metric_count(&self) -> Result<u64> {
        self.count_rows("SELECT COUNT(*) FROM metrics")
    }

    /// Run `write` inside a savepoint.
    ///
    /// Every row `write` adds is rolled back if it returns an error.
    /// Savepoints nest, so `write` may itself call `atomically`.
    pub(crate) fn atomically<T>(&self, write: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("SAVEPOINT alchemy_write")?;
        match write(self) {
            Ok(value) => {
                self.conn.execute_batch("RELEASE alchemy_write")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO alchemy_write; RELEASE alchemy_write")
                {
                    warn!(error = %rollback, "rollback after failed write also failed");
                }
                Err(e)
            }
        }
    }

    fn count_rows(&self, sql: &str) -> Result<u64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }
}

/// Builder for [`ExperimentStore`].
#[derive(Debug, Default)]
pub struct StoreBuilder {
    location: StoreLocation,
}

impl StoreBuilder {
    /// Store data in the given database file.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = StoreLocation::File(path.into());
        self
    }

    /// Keep data in memory only.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.location = StoreLocation::Memory;
        self
    }

    /// Take the location from a loaded configuration.
    #[must_use]
    pub fn config(mut self, config: &Config) -> Self {
        self.location = config.database.clone();
        self
    }

    /// Open the store.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialised.
    pub fn build(self) -> Result<ExperimentStore> {
        match self.location {
            StoreLocation::File(path) => ExperimentStore::open(path),
            StoreLocation::Memory => ExperimentStore::open_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_default() {
        let store = ExperimentStore::open_in_memory().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.run_count().unwrap(), 0);
        assert_eq!(store.snapshot_row_count().unwrap(), 0);
        assert_eq!(store.metric_count().unwrap(), 0);
    }

    #[test]
    fn test_builder_in_memory() {
        let store = ExperimentStore::builder().in_memory().build().unwrap();
        assert_eq!(store.run_count().unwrap(), 0);
    }

    #[test]
    fn test_atomically_rolls_back_nested_writes() {
        let store = ExperimentStore::open_in_memory().unwrap();
        let result: Result<()> = store.atomically(|s| {
            let run_id = s.create_run(crate::experiment::NewRun::new(1, "BTree", 10, 1))?;
            s.append_metric(run_id, 0, 1.0, 1)?;
            s.append_metric(run_id, 0, 1.0, 1)?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(store.is_empty().unwrap());

        let run_id = store
            .atomically(|s| s.create_run(crate::experiment::NewRun::new(1, "BTree", 10, 1)))
            .unwrap();
        assert!(store.run_exists(run_id).unwrap());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let store = ExperimentStore::open_in_memory().unwrap();
        store.conn.execute_batch(SCHEMA).unwrap();
        assert!(store.is_empty().unwrap());
    }
}
