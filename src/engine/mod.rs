//! Seam to the external simulation engine
//!
//! Expression generation, collision rules and entropy all live in a native
//! engine outside this crate. The driver only needs the handful of calls
//! below, so any engine binding (or a scripted test double) can implement
//! them.

mod generator;

pub use generator::{
    BTreeParams, FileParams, FontanaParams, GeneratorConfig, Standardization,
};

use thiserror::Error;

/// Failure reported by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    /// Create an engine error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A live expression population ("soup") inside the engine.
pub trait Population {
    /// Merge expressions into the population.
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects an expression.
    fn perturb(&mut self, expressions: &[String]) -> Result<(), EngineError>;

    /// Advance the population by exactly one collision.
    ///
    /// # Errors
    ///
    /// Returns error if the collision fails inside the engine.
    fn step(&mut self) -> Result<(), EngineError>;

    /// Current population as a (possibly repeating) list of expressions.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot render its state.
    fn expressions(&self) -> Result<Vec<String>, EngineError>;

    /// Entropy of the current population.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot compute it.
    fn entropy(&self) -> Result<f64, EngineError>;
}

/// Factory for populations and generated starting expressions.
pub trait Engine {
    /// Population type produced by this engine.
    type Population: Population;

    /// Construct an empty population seeded for reproducibility.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot allocate a population.
    fn population(&self, seed: i64) -> Result<Self::Population, EngineError>;

    /// Generate the starting expressions for an engine-side generator
    /// (`BTree`, `Fontana`).
    ///
    /// # Errors
    ///
    /// Returns error if the generator is unsupported or fails.
    fn generate(&self, generator: &GeneratorConfig, seed: i64)
        -> Result<Vec<String>, EngineError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    type Population = E::Population;

    fn population(&self, seed: i64) -> Result<Self::Population, EngineError> {
        (**self).population(seed)
    }

    fn generate(
        &self,
        generator: &GeneratorConfig,
        seed: i64,
    ) -> Result<Vec<String>, EngineError> {
        (**self).generate(generator, seed)
    }
}
