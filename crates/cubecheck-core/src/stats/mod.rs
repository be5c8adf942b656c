//! Per-variable summary statistics and their extraction from a dataset.
//!
//! A [`BandStatistics`] record keeps every field optional: records read from
//! a reference file may be partial, and upserts merge field by field.

pub mod extract;
pub mod summary;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use extract::{BandSelection, ExtractOptions, NanPolicy, StatisticsExtractor};
pub use summary::{linear_quantile, summarize};

/// Beyond this many places an `f64` has no digits left to round.
pub const MAX_ROUND_DECIMALS: u32 = 15;

/// Variable name → statistics. Equality ignores key order.
pub type ScenarioStatistics = IndexMap<String, BandStatistics>;

/// One statistic field, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Variance,
    Min,
    Max,
    Quantile25,
    Quantile50,
    Quantile75,
}

impl Statistic {
    pub const ALL: [Statistic; 7] = [
        Statistic::Mean,
        Statistic::Variance,
        Statistic::Min,
        Statistic::Max,
        Statistic::Quantile25,
        Statistic::Quantile50,
        Statistic::Quantile75,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Variance => "variance",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Quantile25 => "quantile25",
            Statistic::Quantile50 => "quantile50",
            Statistic::Quantile75 => "quantile75",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary statistics of one variable.
///
/// NaN values serialise as JSON `null` and read back as absent fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantile25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantile50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantile75: Option<f64>,
}

impl BandStatistics {
    /// A record with every field set to the same value. Used for variables
    /// with no usable samples (`f64::NAN`).
    pub fn filled(value: f64) -> Self {
        let mut stats = Self::default();
        for stat in Statistic::ALL {
            stats.set(stat, value);
        }
        stats
    }

    pub fn get(&self, stat: Statistic) -> Option<f64> {
        match stat {
            Statistic::Mean => self.mean,
            Statistic::Variance => self.variance,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Quantile25 => self.quantile25,
            Statistic::Quantile50 => self.quantile50,
            Statistic::Quantile75 => self.quantile75,
        }
    }

    pub fn set(&mut self, stat: Statistic, value: f64) {
        let slot = match stat {
            Statistic::Mean => &mut self.mean,
            Statistic::Variance => &mut self.variance,
            Statistic::Min => &mut self.min,
            Statistic::Max => &mut self.max,
            Statistic::Quantile25 => &mut self.quantile25,
            Statistic::Quantile50 => &mut self.quantile50,
            Statistic::Quantile75 => &mut self.quantile75,
        };
        *slot = Some(value);
    }

    /// Present fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Statistic, f64)> + '_ {
        Statistic::ALL
            .into_iter()
            .filter_map(move |stat| self.get(stat).map(|v| (stat, v)))
    }

    /// The same record without NaN or infinite fields.
    pub fn finite(&self) -> Self {
        let mut out = Self::default();
        for (stat, value) in self.iter().filter(|(_, v)| v.is_finite()) {
            out.set(stat, value);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Overwrite every field that is present in `newer`; keep the rest.
    pub fn merge_from(&mut self, newer: &BandStatistics) {
        for (stat, value) in newer.iter() {
            self.set(stat, value);
        }
    }

    /// Round every present field to `decimals` places, ties to even.
    /// `decimals` is capped at [`MAX_ROUND_DECIMALS`]; values too large to
    /// scale are kept as they are.
    pub fn rounded(&self, decimals: u32) -> Self {
        let scale = 10f64.powi(decimals.min(MAX_ROUND_DECIMALS) as i32);
        let mut out = Self::default();
        for (stat, value) in self.iter() {
            let scaled = value * scale;
            let rounded = if scaled.is_finite() {
                scaled.round_ties_even() / scale
            } else {
                value
            };
            out.set(stat, rounded);
        }
        out
    }

    /// Checks `min <= q25 <= q50 <= q75 <= max` and `variance >= 0` over the
    /// fields that are present. NaN fields fail the check.
    pub fn is_ordered(&self) -> bool {
        let chain: Vec<f64> = [
            self.min,
            self.quantile25,
            self.quantile50,
            self.quantile75,
            self.max,
        ]
        .into_iter()
        .flatten()
        .collect();
        let ordered = chain.windows(2).all(|w| w[0] <= w[1]);
        let variance_ok = self.variance.map_or(true, |v| v >= 0.0);
        ordered && variance_ok && chain.iter().all(|v| !v.is_nan())
    }
}
