//! Metric Record - per-step scalar summaries for runs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Metric Record represents the summary of one sampled step.
///
/// Entropy is computed by the simulation engine and stored verbatim;
/// `unique_count` is the number of distinct expressions at that step.
/// At most one record exists per `(run_id, step_index)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: i64,
    step_index: u64,
    entropy: f64,
    unique_count: u64,
}

impl MetricRecord {
    /// Create a new metric record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `step_index` - Sampled step (0 is the initial population)
    /// * `entropy` - Population entropy reported by the engine
    /// * `unique_count` - Number of distinct expressions
    #[must_use]
    pub const fn new(run_id: i64, step_index: u64, entropy: f64, unique_count: u64) -> Self {
        Self {
            run_id,
            step_index,
            entropy,
            unique_count,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub const fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Get the step index.
    #[must_use]
    pub const fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Get the entropy value.
    #[must_use]
    pub const fn entropy(&self) -> f64 {
        self.entropy
    }

    /// Get the distinct-expression count.
    #[must_use]
    pub const fn unique_count(&self) -> u64 {
        self.unique_count
    }

    /// Get the value of a named metric as a float for plotting.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, metric: MetricName) -> f64 {
        match metric {
            MetricName::Entropy => self.entropy,
            MetricName::UniqueCount => self.unique_count as f64,
        }
    }
}

/// Metrics that can be charted and compared across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Population entropy
    Entropy,
    /// Number of distinct expressions
    #[serde(alias = "unique_expressions")]
    UniqueCount,
}

impl MetricName {
    /// Canonical name, also the metric column name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entropy => "entropy",
            Self::UniqueCount => "unique_count",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "entropy" => Ok(Self::Entropy),
            "unique_count" | "unique_expressions" => Ok(Self::UniqueCount),
            other => Err(Error::validation(format!(
                "unknown metric '{other}' (expected 'entropy' or 'unique_count')"
            ))),
        }
    }
}

/// One `(step_index, value)` point of a metric series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    /// Sampled step
    pub step_index: u64,
    /// Metric value at that step
    pub value: f64,
}

/// A single run's series for one metric, with the metadata charts label it by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSeries {
    /// Run the series belongs to
    pub run_id: i64,
    /// Generator tag of the run
    pub generator_type: String,
    /// Engine seed of the run
    pub seed: i64,
    /// Points in ascending step order
    pub points: Vec<SeriesPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new(1, 10, 1.5, 4);
        assert_eq!(metric.run_id(), 1);
        assert_eq!(metric.step_index(), 10);
        assert!((metric.entropy() - 1.5).abs() < f64::EPSILON);
        assert_eq!(metric.unique_count(), 4);
    }

    #[test]
    fn test_metric_value_by_name() {
        let metric = MetricRecord::new(1, 0, 0.25, 9);
        assert!((metric.value(MetricName::Entropy) - 0.25).abs() < f64::EPSILON);
        assert!((metric.value(MetricName::UniqueCount) - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metric_name_parsing() {
        assert_eq!("entropy".parse::<MetricName>().unwrap(), MetricName::Entropy);
        assert_eq!(
            "unique_expressions".parse::<MetricName>().unwrap(),
            MetricName::UniqueCount
        );
        assert!("entropy; DROP TABLE runs".parse::<MetricName>().is_err());
    }
}
