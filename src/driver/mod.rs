//! Run driver: executes one simulation run end to end
//!
//! ```text
//! Created ──> Initial sample (step 0) ──> Advancing ──> Terminal
//!                                          │   ▲
//!                                          └───┘ step; sample when
//!                                                step % interval == 0
//!                                                or step == budget
//! ```
//!
//! Runs execute synchronously on the calling thread. Rows are committed as
//! they are produced, so another reader can poll the store for progress.

mod schedule;

pub use schedule::SampleSchedule;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::engine::{Engine, EngineError, FileParams, GeneratorConfig, Population};
use crate::experiment::{count_expressions, expand_snapshot, NewRun, StepSelector};
use crate::store::ExperimentStore;
use crate::{Error, Result};

/// Upper bound on samples reserved up front; longer runs grow as they go.
const MAX_RESERVED_SAMPLES: usize = 1024;

/// Everything needed to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Engine seed
    pub seed: i64,
    /// Starting-population generator
    #[serde(rename = "input_expressions")]
    pub generator: GeneratorConfig,
    /// Total collisions to run
    #[serde(rename = "total_collisions", alias = "total_collisons")]
    pub step_budget: u64,
    /// Collisions between persisted samples
    #[serde(rename = "polling_frequency")]
    pub sample_interval: u64,
    /// Optional display name
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl RunConfig {
    /// Create a run configuration.
    #[must_use]
    pub const fn new(
        seed: i64,
        generator: GeneratorConfig,
        step_budget: u64,
        sample_interval: u64,
    ) -> Self {
        Self {
            seed,
            generator,
            step_budget,
            sample_interval,
            display_name: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Validate the configuration without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a budget or interval that is zero or
    /// too large to store, or invalid generator parameters.
    pub fn validate(&self) -> Result<()> {
        SampleSchedule::new(self.step_budget, self.sample_interval)?;
        self.generator.validate()?;
        self.to_new_run()?.validate()
    }

    fn to_new_run(&self) -> Result<NewRun> {
        let mut new_run = NewRun::new(
            self.seed,
            self.generator.generator_type(),
            self.step_budget,
            self.sample_interval,
        )
        .generator_params(self.generator.params_json()?)
        .freevar_probability(self.generator.freevar_probability());
        if let Some(name) = &self.display_name {
            new_run = new_run.display_name(name.as_str());
        }
        Ok(new_run)
    }
}

/// Summary of one sampled step, as written to the metric store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSample {
    /// Sampled step
    pub step_index: u64,
    /// Entropy reported by the engine
    pub entropy: f64,
    /// Distinct expressions at that step
    pub unique_count: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Id of the stored run
    pub run_id: i64,
    /// Every sample written, in step order (step 0 first)
    pub samples: Vec<StepSample>,
}

/// Drives an engine and records its samples in a store.
pub struct RunDriver<'a, E> {
    store: &'a ExperimentStore,
    engine: E,
}

impl<'a, E: Engine> RunDriver<'a, E> {
    /// Create a driver writing to `store`.
    pub const fn new(store: &'a ExperimentStore, engine: E) -> Self {
        Self { store, engine }
    }

    /// Execute a run to completion.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] before anything is written if the
    ///   configuration is invalid or yields no starting expressions.
    /// - [`Error::Engine`] carrying the run id if the engine fails after
    ///   the run row exists; rows already written stay in place.
    /// - Storage errors as they happen, without retry.
    pub fn run(&self, config: &RunConfig) -> Result<RunOutcome> {
        config.validate()?;
        let schedule = SampleSchedule::new(config.step_budget, config.sample_interval)?;

        // Local expressions are resolved before the run exists so a bad file
        // never leaves an empty run behind.
        let local = match &config.generator {
            GeneratorConfig::FromFile(params) => {
                let expressions = params.load()?;
                if expressions.is_empty() {
                    return Err(Error::validation("no starting expressions were provided"));
                }
                Some(expressions)
            }
            GeneratorConfig::BTree(_) | GeneratorConfig::Fontana(_) => None,
        };

        let run_id = self.store.create_run(config.to_new_run()?)?;
        let span = info_span!("run", run_id);
        let _guard = span.enter();

        let engine_err = move |e: EngineError| {
            warn!(run_id, error = %e, "engine failed; leaving partial run");
            Error::Engine {
                run_id,
                message: e.0,
            }
        };

        let mut population = self.engine.population(config.seed).map_err(engine_err)?;
        let expressions = match local {
            Some(expressions) => expressions,
            None => self
                .engine
                .generate(&config.generator, config.seed)
                .map_err(engine_err)?,
        };
        population.perturb(&expressions).map_err(engine_err)?;

        let mut samples = Vec::with_capacity(schedule.sample_count().min(MAX_RESERVED_SAMPLES));
        samples.push(self.sample(run_id, 0, &population)?);

        let mut step = 0;
        while step < schedule.step_budget() {
            population.step().map_err(engine_err)?;
            step += 1;
            if schedule.is_sample(step) {
                samples.push(self.sample(run_id, step, &population)?);
            }
        }

        info!(run_id, steps = step, samples = samples.len(), "run complete");
        Ok(RunOutcome { run_id, samples })
    }

    /// Start a new run from the last stored state of an existing one.
    ///
    /// The new run copies the seed, budget and interval of the source run.
    /// Its population is the source's last snapshot with every expression
    /// repeated `count` times; the order within that step is not preserved.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the source run does not exist,
    /// [`Error::Validation`] if it has no snapshots, otherwise as
    /// [`RunDriver::run`].
    pub fn continue_run(
        &self,
        source_run_id: i64,
        display_name: Option<&str>,
    ) -> Result<RunOutcome> {
        let source = self
            .store
            .get_run(source_run_id)?
            .ok_or(Error::NotFound {
                run_id: source_run_id,
            })?;

        let last = self.store.get_snapshot(source_run_id, StepSelector::Last)?;
        if last.is_empty() {
            return Err(Error::validation(format!(
                "run {source_run_id} has no stored expressions to continue from"
            )));
        }

        let population = expand_snapshot(&last);
        let params = FileParams {
            direct_input: Some(population.join("\n")),
            continued_from: Some(source_run_id),
            ..FileParams::default()
        };
        let mut config = RunConfig::new(
            source.seed(),
            GeneratorConfig::FromFile(params),
            source.step_budget(),
            source.sample_interval(),
        );
        if let Some(name) = display_name {
            config = config.display_name(name);
        }

        info!(source_run_id, expressions = population.len(), "continuing run");
        self.run(&config)
    }

    fn sample(
        &self,
        run_id: i64,
        step_index: u64,
        population: &E::Population,
    ) -> Result<StepSample> {
        let engine_err = move |e: EngineError| Error::Engine {
            run_id,
            message: e.0,
        };

        let state = population.expressions().map_err(engine_err)?;
        let entropy = population.entropy().map_err(engine_err)?;
        if !entropy.is_finite() {
            return Err(Error::Engine {
                run_id,
                message: format!("engine reported non-finite entropy {entropy} at step {step_index}"),
            });
        }

        let counts = count_expressions(&state);
        let unique_count = counts.len() as u64;
        self.store
            .append_snapshot_entries(run_id, step_index, &counts)?;
        self.store
            .append_metric(run_id, step_index, entropy, unique_count)?;

        Ok(StepSample {
            step_index,
            entropy,
            unique_count,
        })
    }
}
