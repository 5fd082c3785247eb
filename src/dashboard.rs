//! Presentation-facing facade
//!
//! One [`Dashboard`] serves every request the web layer makes: creating,
//! listing, renaming, comparing and continuing runs, plus JSON import/export
//! and per-session uploads. Form parsing and the structured
//! success/failure envelope live here too, so the web layer stays a thin
//! translation of HTTP into these calls.
//!
//! ```rust,no_run
//! # use alchemy_db::dashboard::{ApiResponse, Dashboard};
//! # use alchemy_db::config::Config;
//! # fn demo<E: alchemy_db::engine::Engine>(engine: E) -> alchemy_db::Result<()> {
//! let dashboard = Dashboard::open(Config::default().with_env_overrides(), engine)?;
//! let response = ApiResponse::from_result(dashboard.list_runs(), "runs loaded");
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::driver::{RunConfig, RunDriver, RunOutcome};
use crate::engine::{
    BTreeParams, Engine, FileParams, FontanaParams, GeneratorConfig, Standardization,
};
use crate::experiment::{MetricName, RunRecord, SnapshotEntry, StepSelector};
use crate::interchange::{export_run, import_output, ExperimentOutput};
use crate::query::{CollisionDetail, Comparison, QueryEngine, RunDetail};
use crate::session::{SessionId, UploadCache, UploadSummary, UploadedFile};
use crate::store::ExperimentStore;
use crate::{Error, Result};

/// Store, engine and upload cache behind the dashboard.
pub struct Dashboard<E: Engine> {
    store: ExperimentStore,
    engine: E,
    uploads: UploadCache,
    config: Config,
}

impl<E: Engine> Dashboard<E> {
    /// Open the store named by `config` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened.
    pub fn open(config: Config, engine: E) -> Result<Self> {
        let store = ExperimentStore::builder().config(&config).build()?;
        Ok(Self::new(store, engine, config))
    }

    /// Wrap an already opened store.
    pub fn new(store: ExperimentStore, engine: E, config: Config) -> Self {
        Self {
            store,
            engine,
            uploads: UploadCache::new(),
            config,
        }
    }

    /// Underlying store.
    pub const fn store(&self) -> &ExperimentStore {
        &self.store
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn driver(&self) -> RunDriver<'_, &E> {
        RunDriver::new(&self.store, &self.engine)
    }

    fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.store)
    }

    /// Execute a run to completion.
    ///
    /// # Errors
    ///
    /// See [`RunDriver::run`].
    pub fn create_run(&self, config: &RunConfig) -> Result<RunOutcome> {
        let outcome = self.driver().run(config)?;
        info!(run_id = outcome.run_id, "created run");
        Ok(outcome)
    }

    /// Parse dashboard form fields and execute the run they describe.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for unparsable fields, otherwise as
    /// [`Dashboard::create_run`].
    pub fn create_run_from_form(&self, form: &HashMap<String, String>) -> Result<RunOutcome> {
        let config = parse_run_form(form, &self.config)?;
        self.create_run(&config)
    }

    /// Most recent runs, up to the configured page size.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        self.store.list_runs(Some(self.config.list_limit))
    }

    /// Detail view of a run.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub fn run_detail(&self, run_id: i64) -> Result<RunDetail> {
        self.query().run_detail(run_id)
    }

    /// Snapshot of a run at a step, or its last step.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub fn snapshot(
        &self,
        run_id: i64,
        step: impl Into<StepSelector>,
    ) -> Result<Vec<SnapshotEntry>> {
        self.query().snapshot(run_id, step)
    }

    /// Entropy and histogram of a run at one collision.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub fn collision_detail(&self, run_id: i64, step_index: u64) -> Result<CollisionDetail> {
        self.query().collision_detail(run_id, step_index)
    }

    /// Change a run's display name.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a blank name, [`Error::NotFound`] if the
    /// run does not exist.
    pub fn rename_run(&self, run_id: i64, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(Error::validation("run name must not be empty"));
        }
        if !self.store.rename_run(run_id, new_name)? {
            return Err(Error::NotFound { run_id });
        }
        Ok(())
    }

    /// Compare a metric, given by name, across runs.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an unknown metric name.
    pub fn compare(&self, run_ids: &[i64], metric: &str) -> Result<Comparison> {
        let metric = MetricName::from_str(metric)?;
        self.query().compare(run_ids, metric)
    }

    /// Start a new run from an existing run's last state.
    ///
    /// # Errors
    ///
    /// See [`RunDriver::continue_run`].
    pub fn continue_run(&self, source_run_id: i64, display_name: Option<&str>) -> Result<RunOutcome> {
        self.driver().continue_run(source_run_id, display_name)
    }

    /// Import an experiment document as a new run.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or cannot be stored.
    pub fn import_json(&self, json: &str) -> Result<i64> {
        let output = ExperimentOutput::from_json_str(json)?;
        import_output(&self.store, &output)
    }

    /// Render a stored run as an experiment document.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub fn export_json(&self, run_id: i64) -> Result<String> {
        export_run(&self.store, run_id)?.to_json_string()
    }

    /// Start an upload session.
    pub fn open_session(&self) -> SessionId {
        self.uploads.open_session()
    }

    /// Upload a document into a session; returns its index.
    ///
    /// # Errors
    ///
    /// See [`UploadCache::upload`].
    pub fn upload(&self, session: SessionId, file_name: &str, bytes: &[u8]) -> Result<usize> {
        self.uploads.upload(session, file_name, bytes)
    }

    /// Uploads of a session.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the session is not open.
    pub fn uploads(&self, session: SessionId) -> Result<Vec<UploadSummary>> {
        self.uploads.uploads(session)
    }

    /// One upload of a session.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the session or index is unknown.
    pub fn uploaded_file(&self, session: SessionId, index: usize) -> Result<UploadedFile> {
        self.uploads.get(session, index)
    }

    /// End a session, discarding its uploads.
    pub fn close_session(&self, session: SessionId) -> bool {
        self.uploads.close_session(session)
    }
}

/// Parse the run-creation form.
///
/// Missing or blank fields take their defaults: generator `Fontana`, and the
/// budget, interval and seed from `config`. Generator parameters default as
/// in [`BTreeParams`] and [`FontanaParams`].
///
/// # Errors
///
/// [`Error::Validation`] for an unparsable number, an unknown generator or
/// standardization, or a `from_file` form with neither a file nor input.
pub fn parse_run_form(form: &HashMap<String, String>, config: &Config) -> Result<RunConfig> {
    let generator_type = text(form, "generator_type").unwrap_or("Fontana");

    let generator = match generator_type {
        "BTree" => {
            let defaults = BTreeParams::default();
            GeneratorConfig::BTree(BTreeParams {
                size: number(form, "btree_size", defaults.size)?,
                freevar_generation_probability: number(
                    form,
                    "freevar_probability",
                    defaults.freevar_generation_probability,
                )?,
                max_free_vars: number(form, "max_free_vars", defaults.max_free_vars)?,
                standardization: text(form, "standardization")
                    .map(Standardization::from_str)
                    .transpose()?
                    .unwrap_or(defaults.standardization),
                num_expressions: number(form, "num_expressions", defaults.num_expressions)?,
            })
        }
        "Fontana" => {
            let defaults = FontanaParams::default();
            GeneratorConfig::Fontana(FontanaParams {
                abs_range: [
                    number(form, "abs_low", defaults.abs_range[0])?,
                    number(form, "abs_high", defaults.abs_range[1])?,
                ],
                app_range: [
                    number(form, "app_low", defaults.app_range[0])?,
                    number(form, "app_high", defaults.app_range[1])?,
                ],
                max_depth: number(form, "max_depth", defaults.max_depth)?,
                max_free_vars: number(form, "fontana_max_fv", defaults.max_free_vars)?,
            })
        }
        "from_file" => {
            let params = FileParams {
                filename: text(form, "filename").map(PathBuf::from),
                direct_input: text(form, "direct_input").map(str::to_string),
                continued_from: None,
            };
            if params.filename.is_none() && params.direct_input.is_none() {
                return Err(Error::validation(
                    "no expressions provided for the from_file generator",
                ));
            }
            GeneratorConfig::FromFile(params)
        }
        other => {
            return Err(Error::validation(format!(
                "unknown generator '{other}' (expected BTree, Fontana or from_file)"
            )))
        }
    };

    let mut run = RunConfig::new(
        number(form, "random_seed", config.default_seed)?,
        generator,
        number(form, "total_collisions", config.default_step_budget)?,
        number(form, "polling_frequency", config.default_sample_interval)?,
    );
    if let Some(name) = text(form, "experiment_name") {
        run = run.display_name(name);
    }
    run.validate()?;
    Ok(run)
}

fn text<'f>(form: &'f HashMap<String, String>, key: &str) -> Option<&'f str> {
    form.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn number<T: FromStr>(form: &HashMap<String, String>, key: &str, default: T) -> Result<T> {
    match text(form, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::validation(format!("{key}: '{raw}' is not a valid number"))),
    }
}

/// Outcome of a dashboard request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    /// Request succeeded
    Success,
    /// Request failed
    Error,
}

/// Structured response envelope: `{"status", "message", "data"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    /// Success or failure
    pub status: ApiStatus,
    /// Human-readable message
    pub message: String,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful response.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Failed response carrying the error's message.
    pub fn error(error: &Error) -> Self {
        Self {
            status: ApiStatus::Error,
            message: error.to_string(),
            data: None,
        }
    }

    /// Wrap a result, using `message` on success.
    pub fn from_result(result: Result<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::success(message, data),
            Err(e) => Self::error(&e),
        }
    }

    /// Whether the request succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ApiStatus::Success)
    }
}
