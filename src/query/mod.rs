//! Query and aggregation over the experiment store
//!
//! Bridges runs, snapshots and metrics into the shapes a dashboard renders,
//! without exposing SQL or row layout:
//!
//! - [`QueryEngine::run_detail`]: everything a single-run view needs
//! - [`QueryEngine::collision_detail`]: entropy and histogram at one step
//! - [`to_series`]: metric rows reshaped into an Arrow frame
//! - [`QueryEngine::compare`]: one metric across runs, in caller order

mod series;

pub use series::{metric_schema, to_series, MetricFrame, STEP_COLUMN};

use serde::Serialize;

use crate::experiment::{MetricName, RunRecord, RunSeries, SnapshotEntry, StepSelector};
use crate::store::ExperimentStore;
use crate::{Error, Result};

/// Run metadata with its metric series and initial population.
#[derive(Debug, Clone)]
pub struct RunDetail {
    /// The run itself
    pub run: RunRecord,
    /// Metric series, ascending by step (may be empty)
    pub metrics: MetricFrame,
    /// Step-0 population, most frequent first (may be empty)
    pub initial_snapshot: Vec<SnapshotEntry>,
}

/// Entropy and expression histogram of one sampled step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionDetail {
    /// Sampled step
    pub step_index: u64,
    /// Entropy at that step, `None` if no metric row was stored
    pub entropy: Option<f64>,
    /// Expressions at that step, most frequent first
    pub histogram: Vec<SnapshotEntry>,
}

/// One metric overlaid across several runs.
///
/// Series keep the order the caller asked for; the first series is drawn
/// with the first palette colour and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    metric: MetricName,
    series: Vec<RunSeries>,
}

impl Comparison {
    /// Compared metric.
    #[must_use]
    pub const fn metric(&self) -> MetricName {
        self.metric
    }

    /// Series in caller order.
    #[must_use]
    pub fn series(&self) -> &[RunSeries] {
        &self.series
    }

    /// Run ids present, in caller order.
    #[must_use]
    pub fn run_ids(&self) -> Vec<i64> {
        self.series.iter().map(|s| s.run_id).collect()
    }

    /// Series for one run.
    #[must_use]
    pub fn get(&self, run_id: i64) -> Option<&RunSeries> {
        self.series.iter().find(|s| s.run_id == run_id)
    }

    /// Number of runs with data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether no requested run had data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Position of each series in a cyclic palette of `palette_len` colours.
    #[must_use]
    pub fn palette_slots(&self, palette_len: usize) -> Vec<(i64, usize)> {
        self.series
            .iter()
            .enumerate()
            .map(|(i, s)| (s.run_id, if palette_len == 0 { 0 } else { i % palette_len }))
            .collect()
    }
}

/// Read-side queries over an [`ExperimentStore`].
pub struct QueryEngine<'a> {
    store: &'a ExperimentStore,
}

impl<'a> QueryEngine<'a> {
    /// Create a query engine over `store`.
    #[must_use]
    pub const fn new(store: &'a ExperimentStore) -> Self {
        Self { store }
    }

    /// Assemble the detail view of a run.
    ///
    /// Only a missing run is an error; a run without metrics or snapshots
    /// yields empty parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist, or a storage
    /// error if a query fails.
    pub fn run_detail(&self, run_id: i64) -> Result<RunDetail> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or(Error::NotFound { run_id })?;
        let metrics = to_series(&self.store.get_metrics(run_id)?)?;
        let initial_snapshot = self.store.get_initial_snapshot(run_id)?;

        Ok(RunDetail {
            run,
            metrics,
            initial_snapshot,
        })
    }

    /// Read a snapshot of an existing run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn snapshot(
        &self,
        run_id: i64,
        step: impl Into<StepSelector>,
    ) -> Result<Vec<SnapshotEntry>> {
        if !self.store.run_exists(run_id)? {
            return Err(Error::NotFound { run_id });
        }
        self.store.get_snapshot(run_id, step)
    }

    /// Entropy and histogram of a run at one step.
    ///
    /// A step that was never sampled yields no entropy and an empty
    /// histogram.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn collision_detail(&self, run_id: i64, step_index: u64) -> Result<CollisionDetail> {
        if !self.store.run_exists(run_id)? {
            return Err(Error::NotFound { run_id });
        }
        let entropy = self
            .store
            .get_metric(run_id, step_index)?
            .map(|metric| metric.entropy());
        let histogram = self.store.get_snapshot(run_id, step_index)?;

        Ok(CollisionDetail {
            step_index,
            entropy,
            histogram,
        })
    }

    /// Compare one metric across runs.
    ///
    /// Runs are returned in the order given (repeats collapsed). Runs that
    /// are missing or have no metric rows are silently left out.
    ///
    /// # Errors
    ///
    /// Returns error if a query fails.
    pub fn compare(&self, run_ids: &[i64], metric: MetricName) -> Result<Comparison> {
        let series = self.store.get_metric_series(run_ids, metric)?;
        Ok(Comparison { metric, series })
    }
}
