//! Snapshot entries - pre-aggregated expression counts for one sampled step

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One distinct expression and its multiplicity at a sampled step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SnapshotEntry {
    /// Expression text as produced by the engine
    pub expression: String,
    /// Multiplicity, always positive for stored rows
    pub count: u64,
}

impl SnapshotEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(expression: impl Into<String>, count: u64) -> Self {
        Self {
            expression: expression.into(),
            count,
        }
    }
}

/// Which step of a run to read a snapshot for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSelector {
    /// An exact step index
    At(u64),
    /// The highest step index stored for the run
    Last,
}

impl From<u64> for StepSelector {
    fn from(step: u64) -> Self {
        Self::At(step)
    }
}

/// Collapse a raw population into `(expression, count)` pairs.
///
/// Entries come out in the order each expression was first seen, so the
/// result is deterministic for a given population.
#[must_use]
pub fn count_expressions<S: AsRef<str>>(population: &[S]) -> Vec<SnapshotEntry> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(population.len());
    let mut entries: Vec<SnapshotEntry> = Vec::new();

    for expression in population {
        let expression = expression.as_ref();
        if let Some(&slot) = index.get(expression) {
            entries[slot].count += 1;
        } else {
            index.insert(expression, entries.len());
            entries.push(SnapshotEntry::new(expression, 1));
        }
    }

    entries
}

/// Expand counted entries back into a flat population.
///
/// Each expression is repeated `count` times. The order of the original
/// population within the step is not recoverable.
#[must_use]
pub fn expand_snapshot(entries: &[SnapshotEntry]) -> Vec<String> {
    let total = entries
        .iter()
        .map(|e| usize::try_from(e.count).unwrap_or(0))
        .sum();
    let mut population = Vec::with_capacity(total);
    for entry in entries {
        for _ in 0..entry.count {
            population.push(entry.expression.clone());
        }
    }
    population
}
