//! JSON interchange with the engine tooling
//!
//! The engine's command-line tooling writes one document per experiment:
//!
//! ```json
//! {
//!   "config": {"input_expressions": {"generator": "BTree", "params": {}},
//!              "total_collisions": 100, "polling_frequency": 10},
//!   "collisions_data": {
//!     "collision_0":  {"state": ["λx.x", "λx.x"], "entropy": 0.0,
//!                      "unique_expressions": ["λx.x"], "len_unique_expressions": 1}
//!   }
//! }
//! ```
//!
//! Documents can be imported as stored runs, rebuilt from stored runs, and
//! summarised per collision for charting without touching the store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::experiment::{count_expressions, expand_snapshot, NewRun, StepSelector};
use crate::store::ExperimentStore;
use crate::{Error, Result};

/// Generator tag used when a document does not name one.
pub const UNKNOWN_GENERATOR: &str = "unknown";
/// Step budget used when a document does not give one.
pub const DEFAULT_IMPORT_BUDGET: u64 = 1000;
/// Sample interval used when a document does not give one.
pub const DEFAULT_IMPORT_INTERVAL: u64 = 10;
/// Seed used when a document does not give one.
pub const DEFAULT_IMPORT_SEED: i64 = 12345;

/// `input_expressions` block as written by the tooling.
///
/// Kept loose: imported documents may name generators this crate cannot
/// configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    /// Generator tag
    #[serde(default = "unknown_generator")]
    pub generator: String,
    /// Generator parameters, stored as given
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn unknown_generator() -> String {
    UNKNOWN_GENERATOR.to_string()
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// `config` block of an experiment document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Starting-population generator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_expressions: Option<GeneratorSpec>,
    /// Total collisions
    #[serde(alias = "total_collisons", skip_serializing_if = "Option::is_none")]
    pub total_collisions: Option<u64>,
    /// Collisions between samples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_frequency: Option<u64>,
    /// Engine seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<i64>,
    /// Experiment name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Anything else the tooling wrote (measurements, paths, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OutputConfig {
    /// Generator tag, or `"unknown"`.
    #[must_use]
    pub fn generator_type(&self) -> &str {
        self.input_expressions
            .as_ref()
            .map_or(UNKNOWN_GENERATOR, |spec| spec.generator.as_str())
    }
}

/// Key of one entry in `collisions_data`.
///
/// `collision_<N>` maps to step `N`; a key without an underscore maps to
/// step 0. Keys order by step.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollisionKey {
    step: u64,
    raw: String,
}

impl CollisionKey {
    /// Canonical key for `step`.
    #[must_use]
    pub fn for_step(step: u64) -> Self {
        Self {
            step,
            raw: format!("collision_{step}"),
        }
    }

    /// Collision number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Key as written in the document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl TryFrom<String> for CollisionKey {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        let step = match raw.split('_').nth(1) {
            None => 0,
            Some(suffix) => suffix.parse::<u64>().map_err(|_| {
                Error::validation(format!("collision key '{raw}' has no numeric step"))
            })?,
        };
        Ok(Self { step, raw })
    }
}

impl From<CollisionKey> for String {
    fn from(key: CollisionKey) -> Self {
        key.raw
    }
}

impl fmt::Display for CollisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Population summary for one collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionData {
    /// Full population, repeats included
    pub state: Vec<String>,
    /// Entropy reported by the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    /// Distinct expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_expressions: Option<Vec<String>>,
    /// Number of distinct expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_unique_expressions: Option<u64>,
}

impl CollisionData {
    /// Distinct-expression count, taken from the most explicit field present.
    #[must_use]
    pub fn unique_count(&self) -> u64 {
        self.len_unique_expressions
            .or_else(|| self.unique_expressions.as_ref().map(|u| u.len() as u64))
            .unwrap_or_else(|| count_expressions(&self.state).len() as u64)
    }
}

/// Per-collision chart point of a document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputPoint {
    /// Collision number
    pub step: u64,
    /// Entropy, 0 when absent
    pub entropy: f64,
    /// Distinct expressions
    pub unique_count: u64,
    /// Population size
    pub total_expressions: u64,
}

/// An experiment document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentOutput {
    /// Experiment configuration
    #[serde(default)]
    pub config: OutputConfig,
    /// Per-collision data, ordered by step
    pub collisions_data: BTreeMap<CollisionKey, CollisionData>,
}

impl ExperimentOutput {
    /// Parse a document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON or a missing
    /// `collisions_data` object, [`Error::Validation`] for a collision key
    /// with a non-numeric step or two keys naming the same step.
    pub fn from_json_str(json: &str) -> Result<Self> {
        // serde_json wraps errors from `try_from`; surface key problems as
        // validation failures.
        let value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(data) = value.get("collisions_data").and_then(|d| d.as_object()) {
            let mut seen: BTreeMap<u64, CollisionKey> = BTreeMap::new();
            for key in data.keys() {
                let key = CollisionKey::try_from(key.clone())?;
                if let Some(previous) = seen.insert(key.step(), key.clone()) {
                    return Err(Error::validation(format!(
                        "collision keys '{previous}' and '{key}' both name step {}",
                        key.step()
                    )));
                }
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Read and parse a document from disk.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Render the document as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Population at the highest collision, empty if there is none.
    #[must_use]
    pub fn last_state(&self) -> &[String] {
        self.collisions_data
            .values()
            .next_back()
            .map_or(&[], |data| data.state.as_slice())
    }

    /// Chart points in ascending step order.
    #[must_use]
    pub fn points(&self) -> Vec<OutputPoint> {
        self.collisions_data
            .iter()
            .map(|(key, data)| OutputPoint {
                step: key.step(),
                entropy: data.entropy.unwrap_or(0.0),
                unique_count: data.unique_count(),
                total_expressions: data.state.len() as u64,
            })
            .collect()
    }
}

/// Store a document as a new run and return its id.
///
/// Missing config values fall back to generator `"unknown"`, budget 1000,
/// interval 10 and seed 12345. Collisions are written in ascending step order
/// as one snapshot and one metric row each. The import is all or nothing: if
/// any row fails, the run and everything written for it are rolled back.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the config is unusable, or a storage
/// error (including duplicate steps) while writing rows.
pub fn import_output(store: &ExperimentStore, output: &ExperimentOutput) -> Result<i64> {
    let config = &output.config;
    let generator_type = config.generator_type().to_string();
    let params = config
        .input_expressions
        .as_ref()
        .map_or_else(empty_params, |spec| spec.params.clone());
    let freevar_probability = if generator_type == "BTree" {
        params
            .get("freevar_generation_probability")
            .and_then(serde_json::Value::as_f64)
    } else {
        None
    };

    let mut new_run = NewRun::new(
        config.random_seed.unwrap_or(DEFAULT_IMPORT_SEED),
        generator_type,
        config.total_collisions.unwrap_or(DEFAULT_IMPORT_BUDGET),
        config.polling_frequency.unwrap_or(DEFAULT_IMPORT_INTERVAL),
    )
    .generator_params(params)
    .freevar_probability(freevar_probability);
    if let Some(name) = &config.name {
        new_run = new_run.display_name(name.as_str());
    }

    let run_id = store.atomically(|store| {
        let run_id = store.create_run(new_run)?;
        for (key, data) in &output.collisions_data {
            let entropy = data.entropy.unwrap_or(0.0);
            let written = store.append_snapshot_entries(
                run_id,
                key.step(),
                &count_expressions(&data.state),
            )?;
            store.append_metric(run_id, key.step(), entropy, data.unique_count())?;
            debug!(run_id, step = key.step(), rows = written, "imported collision");
        }
        Ok(run_id)
    })?;

    info!(
        run_id,
        collisions = output.collisions_data.len(),
        "imported experiment output"
    );
    Ok(run_id)
}

/// Rebuild a document from a stored run.
///
/// Populations are reconstructed from counted snapshots, so the order within
/// each collision is not the engine's original order.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the run does not exist.
pub fn export_run(store: &ExperimentStore, run_id: i64) -> Result<ExperimentOutput> {
    let run = store.get_run(run_id)?.ok_or(Error::NotFound { run_id })?;

    let mut collisions_data: BTreeMap<CollisionKey, CollisionData> = BTreeMap::new();
    for step in store.snapshot_steps(run_id)? {
        let entries = store.get_snapshot(run_id, StepSelector::At(step))?;
        let unique: Vec<String> = entries.iter().map(|e| e.expression.clone()).collect();
        collisions_data.insert(
            CollisionKey::for_step(step),
            CollisionData {
                state: expand_snapshot(&entries),
                entropy: None,
                len_unique_expressions: Some(unique.len() as u64),
                unique_expressions: Some(unique),
            },
        );
    }
    for metric in store.get_metrics(run_id)? {
        let data = collisions_data
            .entry(CollisionKey::for_step(metric.step_index()))
            .or_default();
        data.entropy = Some(metric.entropy());
        data.len_unique_expressions = Some(metric.unique_count());
    }

    Ok(ExperimentOutput {
        config: OutputConfig {
            input_expressions: Some(GeneratorSpec {
                generator: run.generator_type().to_string(),
                params: run.generator_params().clone(),
            }),
            total_collisions: Some(run.step_budget()),
            polling_frequency: Some(run.sample_interval()),
            random_seed: Some(run.seed()),
            name: Some(run.display_name().to_string()),
            extra: serde_json::Map::new(),
        },
        collisions_data,
    })
}
