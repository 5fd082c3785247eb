//! Scripted engine shared by the integration tests
//!
//! Each collision replaces the last expression of the population with the
//! first one, so the number of distinct expressions shrinks step by step.
//! Entropy values can be scripted per sampled read, and failures injected at
//! a given step.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use alchemy_db::engine::{Engine, EngineError, GeneratorConfig, Population};

#[derive(Default)]
pub struct ScriptedEngine {
    generated: Vec<String>,
    entropy: Vec<f64>,
    fail_at_step: Option<u64>,
    non_finite_at_read: Option<usize>,
    perturbed: Rc<RefCell<Vec<String>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            generated: ["λx.x", "λx.λy.x", "λx.λy.y", "λx.(x x)"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            ..Self::default()
        }
    }

    /// Expressions returned for engine-side generators.
    pub fn generating(mut self, expressions: &[&str]) -> Self {
        self.generated = expressions.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Entropy reported at the n-th sample, in order.
    pub fn with_entropy(mut self, values: &[f64]) -> Self {
        self.entropy = values.to_vec();
        self
    }

    /// Fail when advancing to `step`.
    pub fn failing_at_step(mut self, step: u64) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    /// Report NaN entropy at the n-th sample.
    pub fn nan_at_read(mut self, read: usize) -> Self {
        self.non_finite_at_read = Some(read);
        self
    }

    /// Every expression merged into the last population.
    pub fn perturbed(&self) -> Vec<String> {
        self.perturbed.borrow().clone()
    }
}

pub struct ScriptedPopulation {
    soup: Vec<String>,
    step: u64,
    reads: Cell<usize>,
    entropy: Vec<f64>,
    fail_at_step: Option<u64>,
    non_finite_at_read: Option<usize>,
    perturbed: Rc<RefCell<Vec<String>>>,
}

impl Population for ScriptedPopulation {
    fn perturb(&mut self, expressions: &[String]) -> Result<(), EngineError> {
        self.soup.extend_from_slice(expressions);
        self.perturbed.borrow_mut().extend_from_slice(expressions);
        Ok(())
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let next = self.step + 1;
        if self.fail_at_step == Some(next) {
            return Err(EngineError::new(format!("collision {next} diverged")));
        }
        if let (Some(first), Some(last)) = (self.soup.first().cloned(), self.soup.last_mut()) {
            *last = first;
        }
        self.step = next;
        Ok(())
    }

    fn expressions(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.soup.clone())
    }

    fn entropy(&self) -> Result<f64, EngineError> {
        let read = self.reads.get();
        self.reads.set(read + 1);
        if self.non_finite_at_read == Some(read) {
            return Ok(f64::NAN);
        }
        Ok(self
            .entropy
            .get(read)
            .copied()
            .unwrap_or(1.0 / (self.step as f64 + 1.0)))
    }
}

impl Engine for ScriptedEngine {
    type Population = ScriptedPopulation;

    fn population(&self, _seed: i64) -> Result<ScriptedPopulation, EngineError> {
        self.perturbed.borrow_mut().clear();
        Ok(ScriptedPopulation {
            soup: Vec::new(),
            step: 0,
            reads: Cell::new(0),
            entropy: self.entropy.clone(),
            fail_at_step: self.fail_at_step,
            non_finite_at_read: self.non_finite_at_read,
            perturbed: Rc::clone(&self.perturbed),
        })
    }

    fn generate(
        &self,
        generator: &GeneratorConfig,
        _seed: i64,
    ) -> Result<Vec<String>, EngineError> {
        if generator.is_local() {
            return Err(EngineError::new("from_file is not an engine generator"));
        }
        Ok(self.generated.clone())
    }
}
