//! Statistics comparison against reference data.
//!
//! Every (variable, statistic) pair is checked and all mismatches are
//! collected before anything is reported. Missing counterparts are warnings,
//! never failures, but a comparison that checked nothing at all fails.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::stats::{ScenarioStatistics, Statistic};

pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// How a statistic is judged against its reference value. One discipline
/// per reference store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Discipline {
    /// `|actual - expected| <= tolerance * |expected|`
    Relative { tolerance: f64 },
    /// `actual == expected`, for references stored pre-rounded.
    Exact,
}

impl Default for Discipline {
    fn default() -> Self {
        Discipline::Relative {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Discipline {
    pub fn accepts(&self, actual: f64, expected: f64) -> bool {
        match *self {
            Discipline::Relative { tolerance } => {
                (actual - expected).abs() <= tolerance * expected.abs()
            }
            Discipline::Exact => actual == expected,
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Relative { tolerance } => write!(f, "relative tolerance {tolerance}"),
            Discipline::Exact => write!(f, "exact match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub variable: String,
    pub statistic: Statistic,
    pub expected: f64,
    pub actual: f64,
    pub discipline: Discipline,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "band '{}', statistic '{}': expected {}, actual {} ({})",
            self.variable, self.statistic, self.expected, self.actual, self.discipline
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonWarning {
    /// A computed variable has no reference record.
    ReferenceMissing { variable: String },
    /// The reference has a statistic the output lacks.
    StatisticMissing {
        variable: String,
        statistic: Statistic,
    },
    /// The reference has a variable the output lacks.
    OutputMissing { variable: String },
}

impl fmt::Display for ComparisonWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonWarning::ReferenceMissing { variable } => {
                write!(f, "band '{variable}' not found in reference")
            }
            ComparisonWarning::StatisticMissing {
                variable,
                statistic,
            } => write!(f, "statistic '{statistic}' not found for band '{variable}' in output"),
            ComparisonWarning::OutputMissing { variable } => {
                write!(f, "reference band '{variable}' not found in output")
            }
        }
    }
}

/// Every mismatch of one scenario. No mismatches means nothing was compared.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionFailure {
    pub scenario: String,
    pub mismatches: Vec<Mismatch>,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mismatches.is_empty() {
            return write!(
                f,
                "Scenario '{}': no statistic could be compared with the reference",
                self.scenario
            );
        }
        write!(
            f,
            "Scenario '{}': {} statistic(s) differ from the reference",
            self.scenario,
            self.mismatches.len()
        )?;
        for m in &self.mismatches {
            write!(f, "\n  {m}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AssertionFailure {}

#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct ComparisonReport {
    /// Number of (variable, statistic) pairs actually compared.
    pub checked: usize,
    pub warnings: Vec<ComparisonWarning>,
    pub mismatches: Vec<Mismatch>,
}

impl ComparisonReport {
    /// No mismatches, and at least one statistic compared.
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.checked > 0
    }

    pub fn into_result(self, scenario: &str) -> Result<Self, AssertionFailure> {
        if self.passed() {
            Ok(self)
        } else {
            Err(AssertionFailure {
                scenario: scenario.to_string(),
                mismatches: self.mismatches,
            })
        }
    }

    fn warn(&mut self, w: ComparisonWarning) {
        warn!("{w}");
        self.warnings.push(w);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Comparator {
    discipline: Discipline,
}

impl Comparator {
    pub fn new(discipline: Discipline) -> Self {
        Self { discipline }
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn compare(
        &self,
        actual: &ScenarioStatistics,
        expected: &ScenarioStatistics,
    ) -> ComparisonReport {
        let mut report = ComparisonReport::default();

        for (variable, output) in actual {
            let Some(reference) = expected.get(variable) else {
                report.warn(ComparisonWarning::ReferenceMissing {
                    variable: variable.clone(),
                });
                continue;
            };
            for (statistic, expected_value) in reference.iter() {
                let Some(actual_value) = output.get(statistic) else {
                    report.warn(ComparisonWarning::StatisticMissing {
                        variable: variable.clone(),
                        statistic,
                    });
                    continue;
                };
                report.checked += 1;
                if !self.discipline.accepts(actual_value, expected_value) {
                    report.mismatches.push(Mismatch {
                        variable: variable.clone(),
                        statistic,
                        expected: expected_value,
                        actual: actual_value,
                        discipline: self.discipline,
                    });
                }
            }
        }

        for variable in expected.keys().filter(|k| !actual.contains_key(*k)) {
            report.warn(ComparisonWarning::OutputMissing {
                variable: variable.clone(),
            });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::BandStatistics;

    fn one(variable: &str, mean: f64) -> ScenarioStatistics {
        [(
            variable.to_string(),
            BandStatistics {
                mean: Some(mean),
                ..Default::default()
            },
        )]
        .into_iter()
        .collect()
    }

    fn relative(tolerance: f64) -> Comparator {
        Comparator::new(Discipline::Relative { tolerance })
    }

    #[test]
    fn within_relative_tolerance_passes() {
        let report = relative(0.02).compare(&one("B02", 100.0), &one("B02", 101.0));
        assert!(report.passed());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn outside_relative_tolerance_fails() {
        let report = relative(0.02).compare(&one("B02", 100.0), &one("B02", 110.0));
        assert!(!report.passed());
        let failure = report.into_result("downsample_spatial").unwrap_err();
        assert_eq!(failure.mismatches.len(), 1);
        let m = &failure.mismatches[0];
        assert_eq!(m.variable, "B02");
        assert_eq!(m.statistic, Statistic::Mean);
        assert_eq!(m.expected, 110.0);
        assert_eq!(m.actual, 100.0);

        let msg = failure.to_string();
        assert!(msg.contains("downsample_spatial"));
        assert!(msg.contains("'B02'"));
        assert!(msg.contains("'mean'"));
    }

    #[test]
    fn missing_reference_key_only_warns() {
        let mut actual = one("B03", 1.0);
        actual.insert("B04".into(), BandStatistics::filled(7.0));
        let mut expected = one("B02", 1.0);
        expected.insert("B04".into(), BandStatistics::filled(7.0));

        let report = relative(0.05).compare(&actual, &expected);
        assert!(report.passed());
        assert_eq!(report.checked, 7);
        assert!(report.warnings.contains(&ComparisonWarning::ReferenceMissing {
            variable: "B03".into()
        }));
        assert!(report.warnings.contains(&ComparisonWarning::OutputMissing {
            variable: "B02".into()
        }));
    }

    #[test]
    fn nothing_compared_is_a_failure() {
        // Disjoint bands: only warnings, and no statistic to judge.
        let report = relative(0.05).compare(&one("B03", 1.0), &one("B02", 1.0));
        assert_eq!(report.checked, 0);
        assert!(report.mismatches.is_empty());
        assert!(!report.passed());
        let failure = report.into_result("mask_scl").unwrap_err();
        assert!(failure.mismatches.is_empty());
        assert!(failure.to_string().contains("no statistic could be compared"));

        // A reference record left with no fields.
        let mut expected = ScenarioStatistics::new();
        expected.insert("B05".into(), BandStatistics::default());
        let actual: ScenarioStatistics = [("B05".to_string(), BandStatistics::filled(1e6))]
            .into_iter()
            .collect();
        assert!(relative(0.05)
            .compare(&actual, &expected)
            .into_result("mask_scl")
            .is_err());
    }

    #[test]
    fn missing_statistic_only_warns() {
        let actual = one("B02", 5.0);
        let mut expected = one("B02", 5.0);
        expected["B02"].max = Some(10.0);

        let report = relative(0.05).compare(&actual, &expected);
        assert!(report.passed());
        assert_eq!(
            report.warnings,
            vec![ComparisonWarning::StatisticMissing {
                variable: "B02".into(),
                statistic: Statistic::Max,
            }]
        );
    }

    #[test]
    fn all_mismatches_are_collected() {
        let actual: ScenarioStatistics = [
            ("B02".to_string(), BandStatistics::filled(1.0)),
            ("B03".to_string(), BandStatistics::filled(1.0)),
        ]
        .into_iter()
        .collect();
        let expected: ScenarioStatistics = [
            ("B02".to_string(), BandStatistics::filled(2.0)),
            ("B03".to_string(), BandStatistics::filled(2.0)),
        ]
        .into_iter()
        .collect();
        let report = relative(0.05).compare(&actual, &expected);
        assert_eq!(report.mismatches.len(), 14);
    }

    #[test]
    fn zero_reference_needs_zero_actual() {
        let c = relative(0.05);
        assert!(c.compare(&one("B02", 0.0), &one("B02", 0.0)).passed());
        assert!(!c.compare(&one("B02", 1e-9), &one("B02", 0.0)).passed());
    }

    #[test]
    fn nan_actual_never_passes() {
        let report = relative(0.5).compare(&one("B02", f64::NAN), &one("B02", 1.0));
        assert!(!report.passed());
    }

    #[test]
    fn exact_discipline() {
        let c = Comparator::new(Discipline::Exact);
        assert!(c.compare(&one("B02", 812.25), &one("B02", 812.25)).passed());
        assert!(!c.compare(&one("B02", 812.26), &one("B02", 812.25)).passed());
    }

    #[test]
    fn discipline_deserialises_from_config_shape() {
        let d: Discipline = serde_json::from_str(r#"{"mode": "relative", "tolerance": 0.01}"#).unwrap();
        assert_eq!(d, Discipline::Relative { tolerance: 0.01 });
        let d: Discipline = serde_json::from_str(r#"{"mode": "exact"}"#).unwrap();
        assert_eq!(d, Discipline::Exact);
    }
}
