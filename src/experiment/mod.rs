//! Experiment data model: runs, snapshots and metrics
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (1) ──┬──< snapshot rows (N) [run_id, step_index, expression] -> count
//!                 └──< MetricRecord (N)  [run_id, step_index] -> entropy, unique_count
//! ```
//!
//! A logical snapshot is every row sharing `(run_id, step_index)`. Step 0 is
//! the initial population, written before the engine advances.
//!
//! ## Usage
//!
//! ```rust
//! use alchemy_db::experiment::{count_expressions, MetricRecord, RunRecord};
//!
//! let new_run = RunRecord::builder(42, "BTree", 50, 10).display_name("baseline");
//! assert!(new_run.validate().is_ok());
//!
//! let counts = count_expressions(&["λx.x", "λx.x", "λy.y"]);
//! assert_eq!(counts.len(), 2);
//!
//! let metric = MetricRecord::new(1, 0, 2.0, counts.len() as u64);
//! assert_eq!(metric.unique_count(), 2);
//! ```

mod metric_record;
mod run_record;
mod snapshot_record;

pub use metric_record::{MetricName, MetricRecord, RunSeries, SeriesPoint};
pub use run_record::{default_display_name, NewRun, RunRecord};
pub use snapshot_record::{count_expressions, expand_snapshot, SnapshotEntry, StepSelector};
