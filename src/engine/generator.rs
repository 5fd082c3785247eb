//! Generator configuration for a run's starting population

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::interchange::ExperimentOutput;
use crate::{Error, Result};

/// How a run's starting expressions are produced.
///
/// Serialized the way experiment configs are exchanged with the engine
/// tooling: `{"generator": "BTree", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "generator", content = "params")]
pub enum GeneratorConfig {
    /// Expressions read from a file and/or typed in directly
    #[serde(rename = "from_file")]
    FromFile(FileParams),
    /// Random binary-tree shaped expressions
    BTree(BTreeParams),
    /// Probabilistic-grammar expressions
    Fontana(FontanaParams),
}

impl GeneratorConfig {
    /// Tag stored as the run's `generator_type`.
    #[must_use]
    pub const fn generator_type(&self) -> &'static str {
        match self {
            Self::FromFile(_) => "from_file",
            Self::BTree(_) => "BTree",
            Self::Fontana(_) => "Fontana",
        }
    }

    /// Parameter payload stored as the run's `generator_params`.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters cannot be rendered as JSON.
    pub fn params_json(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::FromFile(p) => serde_json::to_value(p)?,
            Self::BTree(p) => serde_json::to_value(p)?,
            Self::Fontana(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Free-variable probability, only meaningful for `BTree`.
    #[must_use]
    pub const fn freevar_probability(&self) -> Option<f64> {
        match self {
            Self::BTree(p) => Some(p.freevar_generation_probability),
            Self::FromFile(_) | Self::Fontana(_) => None,
        }
    }

    /// Whether the starting expressions come from this crate rather than the
    /// engine's generators.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::FromFile(_))
    }

    /// Reject parameter combinations no generator can honour.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::FromFile(p) => p.validate(),
            Self::BTree(p) => p.validate(),
            Self::Fontana(p) => p.validate(),
        }
    }
}

/// Parameters for the `from_file` generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileParams {
    /// Expression file: `.json` experiment output or one expression per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,
    /// Expressions typed in directly, one per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_input: Option<String>,
    /// Run whose last state seeded this population
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continued_from: Option<i64>,
}

impl FileParams {
    /// Expressions typed in directly.
    #[must_use]
    pub fn direct(expressions: &str) -> Self {
        Self {
            direct_input: Some(expressions.to_string()),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let has_direct = self
            .direct_input
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        if self.filename.is_none() && !has_direct {
            return Err(Error::validation(
                "from_file generator needs a filename or direct input",
            ));
        }
        Ok(())
    }

    /// Read the starting expressions, file first, then direct input.
    ///
    /// A `.json` file is read as experiment output and contributes the state
    /// of its last sampled collision. Any other file contributes one
    /// expression per non-blank line.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<String>> {
        let mut expressions = Vec::new();

        if let Some(path) = &self.filename {
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if is_json {
                let output = ExperimentOutput::from_json_file(path)?;
                expressions.extend(output.last_state().iter().cloned());
            } else {
                let text = std::fs::read_to_string(path)?;
                expressions.extend(non_blank_lines(&text));
            }
        }

        if let Some(text) = &self.direct_input {
            expressions.extend(non_blank_lines(text));
        }

        Ok(expressions)
    }
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Expression standardization applied by the `BTree` generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Standardization {
    /// Prefix standardization
    #[default]
    Prefix,
    /// Postfix standardization
    Postfix,
    /// Leave expressions as generated
    #[serde(rename = "none")]
    Disabled,
}

impl FromStr for Standardization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(Self::Prefix),
            "postfix" => Ok(Self::Postfix),
            "none" => Ok(Self::Disabled),
            other => Err(Error::validation(format!(
                "unknown standardization '{other}' (expected prefix, postfix or none)"
            ))),
        }
    }
}

/// Parameters for the `BTree` generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeParams {
    /// Tree size
    pub size: u32,
    /// Probability of generating a free variable
    pub freevar_generation_probability: f64,
    /// Upper bound on free variables
    pub max_free_vars: u32,
    /// Standardization mode
    pub standardization: Standardization,
    /// Number of expressions to generate
    pub num_expressions: usize,
}

impl Default for BTreeParams {
    fn default() -> Self {
        Self {
            size: 5,
            freevar_generation_probability: 0.5,
            max_free_vars: 3,
            standardization: Standardization::Prefix,
            num_expressions: 10,
        }
    }
}

impl BTreeParams {
    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::validation("BTree size must be positive"));
        }
        if self.num_expressions == 0 {
            return Err(Error::validation("BTree num_expressions must be positive"));
        }
        check_probability(
            "freevar_generation_probability",
            self.freevar_generation_probability,
        )
    }
}

/// Parameters for the `Fontana` generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontanaParams {
    /// Abstraction probability range `[low, high]`
    pub abs_range: [f64; 2],
    /// Application probability range `[low, high]`
    pub app_range: [f64; 2],
    /// Maximum expression depth
    pub max_depth: u32,
    /// Upper bound on free variables
    pub max_free_vars: u32,
}

impl Default for FontanaParams {
    fn default() -> Self {
        Self {
            abs_range: [0.1, 0.5],
            app_range: [0.2, 0.6],
            max_depth: 5,
            max_free_vars: 2,
        }
    }
}

impl FontanaParams {
    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::validation("Fontana max_depth must be positive"));
        }
        check_range("abs_range", self.abs_range)?;
        check_range("app_range", self.app_range)
    }
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::validation(format!("{name} {p} is outside [0, 1]")))
    }
}

fn check_range(name: &str, [low, high]: [f64; 2]) -> Result<()> {
    check_probability(name, low)?;
    check_probability(name, high)?;
    if low > high {
        return Err(Error::validation(format!(
            "{name} is inverted: low {low} > high {high}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_tagging() {
        let config: GeneratorConfig = serde_json::from_value(serde_json::json!({
            "generator": "BTree",
            "params": {"size": 7, "standardization": "none"}
        }))
        .unwrap();

        let GeneratorConfig::BTree(params) = &config else {
            panic!("expected BTree");
        };
        assert_eq!(params.size, 7);
        assert_eq!(params.standardization, Standardization::Disabled);
        assert_eq!(params.num_expressions, 10);
        assert_eq!(config.freevar_probability(), Some(0.5));
        assert_eq!(config.generator_type(), "BTree");
    }

    #[test]
    fn test_fontana_range_validation() {
        let mut params = FontanaParams::default();
        assert!(GeneratorConfig::Fontana(params.clone()).validate().is_ok());
        params.abs_range = [0.6, 0.2];
        assert!(GeneratorConfig::Fontana(params).validate().is_err());
    }

    #[test]
    fn test_from_file_requires_a_source() {
        let config = GeneratorConfig::FromFile(FileParams::default());
        assert!(config.validate().unwrap_err().is_validation());
        assert!(GeneratorConfig::FromFile(FileParams::direct("λx.x"))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_direct_input_lines() {
        let params = FileParams::direct("  λx.x \n\n λy.y\n");
        assert_eq!(params.load().unwrap(), vec!["λx.x", "λy.y"]);
    }

    #[test]
    fn test_params_json_omits_absent_fields() {
        let config = GeneratorConfig::FromFile(FileParams::direct("a"));
        let json = config.params_json().unwrap();
        assert!(json.get("filename").is_none());
        assert_eq!(json["direct_input"], "a");
    }

    #[test]
    fn test_standardization_from_str() {
        assert_eq!("Postfix".parse::<Standardization>().unwrap(), Standardization::Postfix);
        assert!("sideways".parse::<Standardization>().is_err());
    }
}
