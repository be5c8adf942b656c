//! Regression checking for remote datacube pipelines.
//!
//! A scenario's result dataset is reduced to per-band summary statistics
//! ([`stats`]), which are either compared with stored reference values
//! ([`compare`], [`reference`]) or merged into them. [`suite`] ties these
//! together with the scenario catalog and a remote executor.

pub mod compare;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod reference;
pub mod scenario;
pub mod stats;
pub mod suite;

pub use compare::{AssertionFailure, Comparator, ComparisonReport, ComparisonWarning, Discipline};
pub use config::{ConfigError, SuiteConfig};
pub use dataset::{Dataset, InvalidDatasetError, Variable};
pub use error::CubeCheckError;
pub use executor::{BackendConfig, CommandExecutor, RemoteExecutionError, RemoteExecutor};
pub use pipeline::PipelineDescription;
pub use reference::{MissingStore, ReferenceStore, ReferenceStoreError, UpsertOutcome};
pub use scenario::{ScenarioCatalog, ScenarioError, ScenarioParameters};
pub use stats::{BandStatistics, ScenarioStatistics, Statistic, StatisticsExtractor};
pub use suite::{Mode, RegressionSuite, ScenarioOutcome};
