//! Metric store operations

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::ExperimentStore;
use crate::experiment::{MetricName, MetricRecord, RunSeries, SeriesPoint};
use crate::{Error, Result};

impl ExperimentStore {
    /// Insert the summary row for one sampled step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a non-finite entropy, or a storage
    /// error if the run does not exist or the step already has a row.
    pub fn append_metric(
        &self,
        run_id: i64,
        step_index: u64,
        entropy: f64,
        unique_count: u64,
    ) -> Result<()> {
        if !entropy.is_finite() {
            return Err(Error::validation(format!(
                "entropy at step {step_index} of run {run_id} is not finite: {entropy}"
            )));
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO metrics (run_id, step_index, entropy, unique_count) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![run_id, step_index, entropy, unique_count])?;
        debug!(run_id, step = step_index, entropy, unique_count, "wrote metric");
        Ok(())
    }

    /// Get every metric row of a run, ascending by step.
    ///
    /// This is the primary query for time-series charts.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn get_metrics(&self, run_id: i64) -> Result<Vec<MetricRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT run_id, step_index, entropy, unique_count FROM metrics \
             WHERE run_id = ?1 ORDER BY step_index",
        )?;
        let metrics = stmt
            .query_map(params![run_id], map_metric_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(metrics)
    }

    /// Get the metric row of a single step.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn get_metric(&self, run_id: i64, step_index: u64) -> Result<Option<MetricRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT run_id, step_index, entropy, unique_count FROM metrics \
                 WHERE run_id = ?1 AND step_index = ?2",
                params![run_id, step_index],
                map_metric_row,
            )
            .optional()?)
    }

    /// Get one metric for several runs.
    ///
    /// Entries follow the order of `run_ids`, with repeated ids kept once.
    /// Runs that do not exist or have no metric rows are left out.
    ///
    /// # Errors
    ///
    /// Returns error if a query fails.
    pub fn get_metric_series(
        &self,
        run_ids: &[i64],
        metric: MetricName,
    ) -> Result<Vec<RunSeries>> {
        // Column names are fixed per variant, never taken from input.
        let series_sql = match metric {
            MetricName::Entropy => {
                "SELECT step_index, entropy FROM metrics WHERE run_id = ?1 ORDER BY step_index"
            }
            MetricName::UniqueCount => {
                "SELECT step_index, CAST(unique_count AS REAL) FROM metrics \
                 WHERE run_id = ?1 ORDER BY step_index"
            }
        };

        let mut seen = HashSet::with_capacity(run_ids.len());
        let mut result = Vec::with_capacity(run_ids.len());

        for &run_id in run_ids {
            if !seen.insert(run_id) {
                continue;
            }

            let meta: Option<(String, i64)> = self
                .conn
                .query_row(
                    "SELECT generator_type, seed FROM runs WHERE run_id = ?1",
                    params![run_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((generator_type, seed)) = meta else {
                debug!(run_id, "skipping unknown run in comparison");
                continue;
            };

            let mut stmt = self.conn.prepare_cached(series_sql)?;
            let points = stmt
                .query_map(params![run_id], |row| {
                    Ok(SeriesPoint {
                        step_index: row.get(0)?,
                        value: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if points.is_empty() {
                debug!(run_id, "skipping run without metrics in comparison");
                continue;
            }

            result.push(RunSeries {
                run_id,
                generator_type,
                seed,
                points,
            });
        }

        Ok(result)
    }
}

fn map_metric_row(row: &Row<'_>) -> rusqlite::Result<MetricRecord> {
    Ok(MetricRecord::new(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::NewRun;

    #[test]
    fn test_get_metrics_ordering() {
        let store = ExperimentStore::open_in_memory().unwrap();
        let run_id = store.create_run(NewRun::new(1, "BTree", 2, 1)).unwrap();

        // Add out of order
        store.append_metric(run_id, 2, 0.2, 2).unwrap();
        store.append_metric(run_id, 0, 0.0, 1).unwrap();
        store.append_metric(run_id, 1, 0.1, 1).unwrap();

        let metrics = store.get_metrics(run_id).unwrap();
        let steps: Vec<u64> = metrics.iter().map(MetricRecord::step_index).collect();
        assert_eq!(steps, vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_metric_step_rejected() {
        let store = ExperimentStore::open_in_memory().unwrap();
        let run_id = store.create_run(NewRun::new(1, "BTree", 2, 1)).unwrap();
        store.append_metric(run_id, 0, 1.0, 1).unwrap();
        assert!(store.append_metric(run_id, 0, 2.0, 1).is_err());
    }

    #[test]
    fn test_nan_entropy_rejected() {
        let store = ExperimentStore::open_in_memory().unwrap();
        let run_id = store.create_run(NewRun::new(1, "BTree", 2, 1)).unwrap();
        assert!(store.append_metric(run_id, 0, f64::NAN, 1).unwrap_err().is_validation());
    }

    #[test]
    fn test_unique_count_series_values() {
        let store = ExperimentStore::open_in_memory().unwrap();
        let run_id = store.create_run(NewRun::new(9, "Fontana", 1, 1)).unwrap();
        store.append_metric(run_id, 0, 1.0, 7).unwrap();
        store.append_metric(run_id, 1, 0.5, 3).unwrap();

        let series = store
            .get_metric_series(&[run_id], MetricName::UniqueCount)
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].seed, 9);
        assert_eq!(series[0].generator_type, "Fontana");
        assert!((series[0].points[0].value - 7.0).abs() < f64::EPSILON);
        assert!((series[0].points[1].value - 3.0).abs() < f64::EPSILON);
    }
}
