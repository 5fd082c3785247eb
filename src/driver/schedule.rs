//! Sampling schedule for a run

use crate::{Error, Result};

/// Which steps of a run get persisted.
///
/// Step 0, every positive multiple of the interval up to the budget, and
/// the budget itself when it is not a multiple. Each step appears once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSchedule {
    step_budget: u64,
    sample_interval: u64,
}

impl SampleSchedule {
    /// Create a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if either value is zero.
    pub fn new(step_budget: u64, sample_interval: u64) -> Result<Self> {
        if step_budget == 0 {
            return Err(Error::validation("step budget must be positive"));
        }
        if sample_interval == 0 {
            return Err(Error::validation("sample interval must be positive"));
        }
        Ok(Self {
            step_budget,
            sample_interval,
        })
    }

    /// Total steps in the run.
    #[must_use]
    pub const fn step_budget(&self) -> u64 {
        self.step_budget
    }

    /// Steps between samples.
    #[must_use]
    pub const fn sample_interval(&self) -> u64 {
        self.sample_interval
    }

    /// Whether `step` is persisted.
    #[must_use]
    pub const fn is_sample(&self, step: u64) -> bool {
        step <= self.step_budget && (step % self.sample_interval == 0 || step == self.step_budget)
    }

    /// Number of persisted steps, including step 0.
    ///
    /// Saturates at `usize::MAX` for schedules too large to count.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        let multiples = self.step_budget / self.sample_interval;
        let tail = u64::from(self.step_budget % self.sample_interval != 0);
        multiples
            .checked_add(tail)
            .and_then(|n| n.checked_add(1))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX)
    }

    /// Persisted steps in ascending order.
    pub fn steps(&self) -> impl Iterator<Item = u64> + '_ {
        (0..=self.step_budget / self.sample_interval)
            .map(move |k| k * self.sample_interval)
            .chain((self.step_budget % self.sample_interval != 0).then_some(self.step_budget))
    }
}
