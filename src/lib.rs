//! # alchemy-db: experiment store for artificial-chemistry runs
//!
//! Records simulation runs of an external lambda-calculus chemistry engine
//! and serves them back to a dashboard.
//!
//! A run is driven step by step; at every sampled step the population is
//! collapsed into `(expression, count)` rows and a metric row
//! (`entropy`, `unique_count`) is appended. Reads reshape that history into
//! Arrow frames, per-run detail views and cross-run comparisons.
//!
//! ## Layout
//!
//! - [`store`]: `SQLite`-backed run, snapshot and metric stores
//! - [`driver`]: executes a run against an [`engine::Engine`]
//! - [`query`]: detail views, series and comparisons
//! - [`interchange`]: JSON documents written by the engine tooling
//! - [`dashboard`]: one facade for every dashboard request
//!
//! ## Example Usage
//!
//! ```rust
//! use alchemy_db::experiment::{NewRun, StepSelector};
//! use alchemy_db::store::ExperimentStore;
//!
//! let store = ExperimentStore::open_in_memory()?;
//! let run_id = store.create_run(NewRun::new(42, "BTree", 50, 10))?;
//! store.append_snapshot(run_id, 0, "λx.x", 3)?;
//! store.append_metric(run_id, 0, 0.0, 1)?;
//!
//! assert_eq!(store.get_run(run_id)?.unwrap().display_name(), "Run 1");
//! assert_eq!(store.get_snapshot(run_id, StepSelector::Last)?.len(), 1);
//! # Ok::<(), alchemy_db::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dashboard;
pub mod driver;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod interchange;
pub mod logging;
pub mod query;
pub mod session;
pub mod store;

pub use error::{Error, Result};
