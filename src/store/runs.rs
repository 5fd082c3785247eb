//! Run store operations

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, warn};

use super::ExperimentStore;
use crate::experiment::{default_display_name, NewRun, RunRecord};
use crate::Result;

const RUN_COLUMNS: &str = "run_id, seed, generator_type, step_budget, sample_interval, \
     generator_params, freevar_probability, display_name, created_at";

impl ExperimentStore {
    /// Insert a run and return its id.
    ///
    /// The id is allocated inside the insert savepoint, so a run created
    /// without a display name is written as `"Run {run_id}"` in one step and
    /// is never observable with a blank name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the configuration is invalid,
    /// or a storage error if the insert fails.
    ///
    /// # Example
    ///
    /// ```rust
    /// use alchemy_db::experiment::RunRecord;
    /// use alchemy_db::store::ExperimentStore;
    ///
    /// # fn main() -> alchemy_db::Result<()> {
    /// let store = ExperimentStore::open_in_memory()?;
    /// let run_id = store.create_run(RunRecord::builder(42, "BTree", 50, 10))?;
    ///
    /// let run = store.get_run(run_id)?.expect("run exists");
    /// assert_eq!(run.display_name(), format!("Run {run_id}"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_run(&self, new_run: NewRun) -> Result<i64> {
        new_run.validate()?;
        let params_json = serde_json::to_string(&new_run.generator_params)?;

        let (run_id, generator_type) = self.atomically(|store| {
            let run_id: i64 = store.conn.query_row(
                "SELECT COALESCE(MAX(run_id), 0) + 1 FROM runs",
                [],
                |row| row.get(0),
            )?;
            let display_name = new_run
                .display_name
                .unwrap_or_else(|| default_display_name(run_id));

            store.conn.execute(
                "INSERT INTO runs (run_id, seed, generator_type, step_budget, sample_interval, \
                 generator_params, freevar_probability, display_name, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run_id,
                    new_run.seed,
                    new_run.generator_type,
                    new_run.step_budget,
                    new_run.sample_interval,
                    params_json,
                    new_run.freevar_probability,
                    display_name,
                    format_timestamp(new_run.created_at),
                ],
            )?;
            Ok((run_id, new_run.generator_type))
        })?;

        info!(
            run_id,
            generator = %generator_type,
            step_budget = new_run.step_budget,
            sample_interval = new_run.sample_interval,
            "created run"
        );
        Ok(run_id)
    }

    /// Rename a run.
    ///
    /// Returns `Ok(false)` without touching the store when the run does not
    /// exist or the new name is blank. The stored name is trimmed.
    ///
    /// # Errors
    ///
    /// Returns error only if the update itself fails.
    pub fn rename_run(&self, run_id: i64, new_name: &str) -> Result<bool> {
        let name = new_name.trim();
        if name.is_empty() {
            warn!(run_id, "rejected blank run name");
            return Ok(false);
        }

        let changed = self.conn.execute(
            "UPDATE runs SET display_name = ?1 WHERE run_id = ?2",
            params![name, run_id],
        )?;
        if changed > 0 {
            info!(run_id, name, "renamed run");
        }
        Ok(changed > 0)
    }

    /// Get a run by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or the row is corrupt.
    pub fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![run_id], map_run_row)
            .optional()?)
    }

    /// Check whether a run exists.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn run_exists(&self, run_id: i64) -> Result<bool> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM runs WHERE run_id = ?1",
                params![run_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    /// List runs, newest first.
    ///
    /// Runs created in the same instant are ordered by descending id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or a row is corrupt.
    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, run_id DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit], map_run_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Get the highest run id, or `None` for an empty store.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn latest_run_id(&self) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT MAX(run_id) FROM runs", [], |row| row.get(0))?)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let run_id: i64 = row.get(0)?;

    let params_text: String = row.get(5)?;
    let generator_params = serde_json::from_str(&params_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    let created_text: String = row.get(8)?;
    let created_at = DateTime::parse_from_rfc3339(&created_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(RunRecord::from_parts(
        run_id,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        generator_params,
        row.get(6)?,
        row.get(7)?,
        created_at,
    ))
}
