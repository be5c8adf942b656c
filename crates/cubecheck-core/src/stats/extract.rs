//! Dataset → [`ScenarioStatistics`].

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::{summarize, BandStatistics, ScenarioStatistics};
use crate::config::ConfigError;
use crate::dataset::{Dataset, InvalidDatasetError, Variable};

/// Spectral band naming: `B` followed by a digit.
pub const DEFAULT_BAND_PATTERN: &str = r"^B\d";

/// Which data variables count as bands. Fixed per deployment.
#[derive(Debug, Clone)]
pub enum BandSelection {
    /// Names matching the regex (matched from the start of the name).
    Pattern(Regex),
    /// Every data variable except these names.
    Exclude(Vec<String>),
}

impl BandSelection {
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        // Anchor the whole pattern, alternations included.
        Regex::new(&format!("^(?:{pattern})"))
            .map(BandSelection::Pattern)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BandSelection::Exclude(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            BandSelection::Pattern(re) => re.is_match(name),
            BandSelection::Exclude(names) => !names.iter().any(|n| n == name),
        }
    }
}

impl Default for BandSelection {
    fn default() -> Self {
        // The default pattern is a compile-time constant that always parses.
        BandSelection::Pattern(Regex::new(DEFAULT_BAND_PATTERN).unwrap())
    }
}

/// What to do with NaN samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// NaN poisons every statistic of the variable.
    #[default]
    Propagate,
    /// NaN samples are ignored.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub selection: BandSelection,
    /// Round every statistic to this many decimals.
    pub round_decimals: Option<u32>,
    pub nan_policy: NanPolicy,
}

/// Computes per-band statistics. Stateless apart from its options.
#[derive(Debug, Clone, Default)]
pub struct StatisticsExtractor {
    options: ExtractOptions,
}

impl StatisticsExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Statistics for every selected variable, in dataset order.
    ///
    /// Fails if no variable matches the selection.
    pub fn compute(&self, dataset: &Dataset) -> Result<ScenarioStatistics, InvalidDatasetError> {
        let selected: Vec<(&str, &Variable)> = dataset
            .variables()
            .filter(|(name, _)| self.options.selection.matches(name))
            .collect();

        if selected.is_empty() {
            return Err(InvalidDatasetError::NoMatchingVariables {
                source_name: dataset.source_name(),
                available: dataset.names().map(str::to_string).collect(),
            });
        }

        #[cfg(feature = "threading")]
        let iter = selected.par_iter();
        #[cfg(not(feature = "threading"))]
        let iter = selected.iter();

        let computed: Vec<(String, BandStatistics)> = iter
            .map(|(name, var)| (name.to_string(), self.variable_statistics(name, var)))
            .collect();

        Ok(computed.into_iter().collect())
    }

    fn variable_statistics(&self, name: &str, var: &Variable) -> BandStatistics {
        let samples = var.samples();
        let stats = match summarize(&samples, self.options.nan_policy) {
            Some(s) => s,
            None => {
                warn!("Variable '{name}' has no usable samples; statistics are NaN");
                BandStatistics::filled(f64::NAN)
            }
        };
        let stats = match self.options.round_decimals {
            Some(d) => stats.rounded(d),
            None => stats,
        };
        debug!("{name}: {stats:?}");
        stats
    }
}
