//! Snapshot store operations

use rusqlite::params;
use tracing::debug;

use super::ExperimentStore;
use crate::experiment::{SnapshotEntry, StepSelector};
use crate::{Error, Result};

impl ExperimentStore {
    /// Insert one snapshot row.
    ///
    /// Rows are never merged: writing the same `(run_id, step_index,
    /// expression)` twice fails. Callers pre-aggregate counts with
    /// [`crate::experiment::count_expressions`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a zero count, or a storage error if
    /// the run does not exist or the row is a duplicate.
    pub fn append_snapshot(
        &self,
        run_id: i64,
        step_index: u64,
        expression: &str,
        count: u64,
    ) -> Result<()> {
        if count == 0 {
            return Err(Error::validation(format!(
                "snapshot count for '{expression}' must be positive"
            )));
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO snapshots (run_id, step_index, expression, count) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![run_id, step_index, expression, count])?;
        Ok(())
    }

    /// Insert every entry of one sampled step.
    ///
    /// The rows are written in a single savepoint, in the order given.
    ///
    /// # Errors
    ///
    /// Same as [`ExperimentStore::append_snapshot`]; on error nothing from
    /// this call is kept.
    pub fn append_snapshot_entries(
        &self,
        run_id: i64,
        step_index: u64,
        entries: &[SnapshotEntry],
    ) -> Result<usize> {
        self.atomically(|store| {
            for entry in entries {
                store.append_snapshot(run_id, step_index, &entry.expression, entry.count)?;
            }
            Ok(())
        })?;
        debug!(run_id, step = step_index, rows = entries.len(), "wrote snapshot");
        Ok(entries.len())
    }

    /// Read a snapshot, most frequent expression first.
    ///
    /// Equal counts keep insertion order. [`StepSelector::Last`] resolves to
    /// the highest stored step; a run without snapshots yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn get_snapshot(
        &self,
        run_id: i64,
        step: impl Into<StepSelector>,
    ) -> Result<Vec<SnapshotEntry>> {
        let step_index = match step.into() {
            StepSelector::At(step_index) => step_index,
            StepSelector::Last => match self.max_snapshot_step(run_id)? {
                Some(step_index) => step_index,
                None => return Ok(Vec::new()),
            },
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT expression, count FROM snapshots \
             WHERE run_id = ?1 AND step_index = ?2 \
             ORDER BY count DESC, snapshot_id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, step_index], |row| {
                Ok(SnapshotEntry {
                    expression: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Read the initial population (step 0).
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn get_initial_snapshot(&self, run_id: i64) -> Result<Vec<SnapshotEntry>> {
        self.get_snapshot(run_id, 0)
    }

    /// Highest step with snapshot rows for a run.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn max_snapshot_step(&self, run_id: i64) -> Result<Option<u64>> {
        Ok(self.conn.query_row(
            "SELECT MAX(step_index) FROM snapshots WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?)
    }

    /// Distinct steps with snapshot rows, ascending.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn snapshot_steps(&self, run_id: i64) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT step_index FROM snapshots WHERE run_id = ?1 ORDER BY step_index",
        )?;
        let steps = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::NewRun;

    fn store_with_run() -> (ExperimentStore, i64) {
        let store = ExperimentStore::open_in_memory().unwrap();
        let run_id = store.create_run(NewRun::new(1, "BTree", 10, 5)).unwrap();
        (store, run_id)
    }

    #[test]
    fn test_snapshot_ordering_by_count_then_insertion() {
        let (store, run_id) = store_with_run();
        store.append_snapshot(run_id, 0, "a", 1).unwrap();
        store.append_snapshot(run_id, 0, "b", 3).unwrap();
        store.append_snapshot(run_id, 0, "c", 1).unwrap();

        let snapshot = store.get_snapshot(run_id, 0).unwrap();
        let order: Vec<&str> = snapshot.iter().map(|e| e.expression.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_snapshot_row_rejected() {
        let (store, run_id) = store_with_run();
        store.append_snapshot(run_id, 0, "a", 1).unwrap();
        assert!(store.append_snapshot(run_id, 0, "a", 2).is_err());
        assert_eq!(store.get_snapshot(run_id, 0).unwrap()[0].count, 1);
    }

    #[test]
    fn test_zero_count_rejected() {
        let (store, run_id) = store_with_run();
        assert!(store.append_snapshot(run_id, 0, "a", 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_snapshot_for_unknown_run_rejected() {
        let (store, run_id) = store_with_run();
        assert!(store.append_snapshot(run_id + 1, 0, "a", 1).is_err());
    }

    #[test]
    fn test_last_snapshot_of_empty_run() {
        let (store, run_id) = store_with_run();
        assert!(store.get_snapshot(run_id, StepSelector::Last).unwrap().is_empty());
        assert_eq!(store.max_snapshot_step(run_id).unwrap(), None);
    }

    #[test]
    fn test_entries_batch_is_atomic() {
        let (store, run_id) = store_with_run();
        let entries = vec![SnapshotEntry::new("a", 1), SnapshotEntry::new("a", 2)];
        assert!(store.append_snapshot_entries(run_id, 5, &entries).is_err());
        assert!(store.get_snapshot(run_id, 5).unwrap().is_empty());
    }
}
