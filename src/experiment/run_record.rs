//! Run Record - one simulation configuration and its identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Display name assigned to a run created without one.
#[must_use]
pub fn default_display_name(run_id: i64) -> String {
    format!("Run {run_id}")
}

/// Run Record represents a persisted simulation configuration.
///
/// The run id is the sole foreign key of snapshot and metric rows. Everything
/// except `display_name` is write-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: i64,
    seed: i64,
    generator_type: String,
    step_budget: u64,
    sample_interval: u64,
    generator_params: serde_json::Value,
    freevar_probability: Option<f64>,
    display_name: String,
    created_at: DateTime<Utc>,
}

impl RunRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        run_id: i64,
        seed: i64,
        generator_type: String,
        step_budget: u64,
        sample_interval: u64,
        generator_params: serde_json::Value,
        freevar_probability: Option<f64>,
        display_name: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            seed,
            generator_type,
            step_budget,
            sample_interval,
            generator_params,
            freevar_probability,
            display_name,
            created_at,
        }
    }

    /// Create a builder for a run that has not been stored yet.
    #[must_use]
    pub fn builder(
        seed: i64,
        generator_type: impl Into<String>,
        step_budget: u64,
        sample_interval: u64,
    ) -> NewRun {
        NewRun::new(seed, generator_type, step_budget, sample_interval)
    }

    /// Get the run ID.
    #[must_use]
    pub const fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Get the engine seed.
    #[must_use]
    pub const fn seed(&self) -> i64 {
        self.seed
    }

    /// Get the generator tag (e.g. `BTree`, `Fontana`, `from_file`).
    #[must_use]
    pub fn generator_type(&self) -> &str {
        &self.generator_type
    }

    /// Get the total number of steps the run executes.
    #[must_use]
    pub const fn step_budget(&self) -> u64 {
        self.step_budget
    }

    /// Get the number of steps between persisted snapshots.
    #[must_use]
    pub const fn sample_interval(&self) -> u64 {
        self.sample_interval
    }

    /// Get the generator-specific parameter payload.
    #[must_use]
    pub const fn generator_params(&self) -> &serde_json::Value {
        &self.generator_params
    }

    /// Get the free-variable probability, if the generator has one.
    #[must_use]
    pub const fn freevar_probability(&self) -> Option<f64> {
        self.freevar_probability
    }

    /// Get the display name. Never empty for a stored run.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A run configuration waiting to be inserted.
///
/// The store assigns the id and, when no name was given, the
/// `"Run {run_id}"` display name.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub(crate) seed: i64,
    pub(crate) generator_type: String,
    pub(crate) step_budget: u64,
    pub(crate) sample_interval: u64,
    pub(crate) generator_params: serde_json::Value,
    pub(crate) freevar_probability: Option<f64>,
    pub(crate) display_name: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl NewRun {
    /// Create a new run configuration with required fields.
    #[must_use]
    pub fn new(
        seed: i64,
        generator_type: impl Into<String>,
        step_budget: u64,
        sample_interval: u64,
    ) -> Self {
        Self {
            seed,
            generator_type: generator_type.into(),
            step_budget,
            sample_interval,
            generator_params: serde_json::Value::Object(serde_json::Map::new()),
            freevar_probability: None,
            display_name: None,
            created_at: Utc::now(),
        }
    }

    /// Set the generator parameter payload.
    #[must_use]
    pub fn generator_params(mut self, params: serde_json::Value) -> Self {
        self.generator_params = params;
        self
    }

    /// Set the free-variable probability.
    #[must_use]
    pub const fn freevar_probability(mut self, probability: Option<f64>) -> Self {
        self.freevar_probability = probability;
        self
    }

    /// Set the display name. Blank names are treated as absent.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }

    /// Set a custom creation timestamp (useful for imports/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Check the write-once fields before anything touches the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a step budget or sample interval
    /// that is zero or above `i64::MAX`, or an empty generator tag.
    pub fn validate(&self) -> Result<()> {
        if self.step_budget == 0 {
            return Err(Error::validation("step budget must be positive"));
        }
        if self.sample_interval == 0 {
            return Err(Error::validation("sample interval must be positive"));
        }
        if i64::try_from(self.step_budget).is_err() {
            return Err(Error::validation(format!(
                "step budget {} exceeds the storable maximum {}",
                self.step_budget,
                i64::MAX
            )));
        }
        if i64::try_from(self.sample_interval).is_err() {
            return Err(Error::validation(format!(
                "sample interval {} exceeds the storable maximum {}",
                self.sample_interval,
                i64::MAX
            )));
        }
        if self.generator_type.trim().is_empty() {
            return Err(Error::validation("generator type must not be empty"));
        }
        if let Some(p) = self.freevar_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::validation(format!(
                    "freevar probability {p} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
