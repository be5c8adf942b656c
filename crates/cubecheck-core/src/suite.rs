//! A regression suite: one extractor, one comparator and one reference store,
//! all configured from a [`SuiteConfig`].
//!
//! `check` and `record` are the two terminal operations on a dataset.
//! `run_scenario` puts the remote backend in front of them.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::info;

use crate::compare::{Comparator, ComparisonReport};
use crate::config::SuiteConfig;
use crate::dataset::Dataset;
use crate::error::CubeCheckError;
use crate::executor::RemoteExecutor;
use crate::pipeline::PipelineDescription;
use crate::reference::{MissingStore, ReferenceStore, UpsertOutcome};
use crate::scenario::ScenarioParameters;
use crate::stats::{ScenarioStatistics, StatisticsExtractor};

/// What `run_scenario` does with the backend's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Compare against the reference store.
    #[default]
    Check,
    /// Merge into the reference store and save it.
    Update,
    /// Only run the job.
    Execute,
}

impl Mode {
    /// How this mode treats a missing store file. `None` for modes that
    /// never read the store.
    pub fn missing_store(self) -> Option<MissingStore> {
        match self {
            Mode::Check => Some(MissingStore::Fail),
            Mode::Update => Some(MissingStore::StartEmpty),
            Mode::Execute => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Check => "check",
            Mode::Update => "update",
            Mode::Execute => "execute",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioOutcome {
    Passed(ComparisonReport),
    Recorded(UpsertOutcome),
    Executed(PathBuf),
}

#[derive(Debug)]
pub struct RegressionSuite {
    config: SuiteConfig,
    extractor: StatisticsExtractor,
    comparator: Comparator,
    store: ReferenceStore,
}

impl RegressionSuite {
    /// Build the suite and read its reference store.
    pub fn open(config: SuiteConfig, missing: MissingStore) -> Result<Self, CubeCheckError> {
        let store = ReferenceStore::open(&config.reference.path, missing)?;
        Self::with_store(config, store)
    }

    /// Build the suite for `mode`. Execute mode leaves the store file alone,
    /// so it runs even where the file is absent or unreadable.
    pub fn for_mode(config: SuiteConfig, mode: Mode) -> Result<Self, CubeCheckError> {
        match mode.missing_store() {
            Some(missing) => Self::open(config, missing),
            None => Self::with_store(config, ReferenceStore::new()),
        }
    }

    /// Build the suite around an already loaded store.
    pub fn with_store(config: SuiteConfig, store: ReferenceStore) -> Result<Self, CubeCheckError> {
        config.validate()?;
        let extractor = StatisticsExtractor::new(config.extract.to_options()?);
        let comparator = Comparator::new(config.reference.comparison);
        Ok(Self {
            config,
            extractor,
            comparator,
            store,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    pub fn statistics(&self, dataset: &Dataset) -> Result<ScenarioStatistics, CubeCheckError> {
        Ok(self.extractor.compute(dataset)?)
    }

    /// Compare `dataset` with the stored reference for `scenario`. Every
    /// mismatch is collected into one `AssertionFailure`.
    pub fn check(&self, scenario: &str, dataset: &Dataset) -> Result<ComparisonReport, CubeCheckError> {
        let actual = self.statistics(dataset)?;
        let expected = self.store.lookup(scenario)?;
        let report = self
            .comparator
            .compare(&actual, expected)
            .into_result(scenario)?;
        info!(
            "{scenario} - {} statistic(s) within {}",
            report.checked,
            self.comparator.discipline()
        );
        Ok(report)
    }

    /// Merge the statistics of `dataset` into the store and save it.
    pub fn record(&mut self, scenario: &str, dataset: &Dataset) -> Result<UpsertOutcome, CubeCheckError> {
        let statistics = self.statistics(dataset)?;
        let outcome = self.store.upsert(scenario, statistics)?;
        self.store.save(&self.config.reference.path)?;
        info!("{scenario} - reference {outcome:?}");
        Ok(outcome)
    }

    pub fn output_path(&self, output_dir: &Path, scenario: &str) -> PathBuf {
        output_dir.join(format!("{scenario}.{}", self.config.backend.output_format))
    }

    /// Execute one scenario on the backend and then check, record or stop.
    pub fn run_scenario(
        &mut self,
        params: &ScenarioParameters,
        executor: &dyn RemoteExecutor,
        output_dir: &Path,
        mode: Mode,
    ) -> Result<ScenarioOutcome, CubeCheckError> {
        let name = params.scenario_name.as_str();
        info!("{name} - running in {mode} mode");

        let geometry = params.geometry(&self.config.scenarios.geometry_dir)?;
        let pipeline = PipelineDescription::from_scenario(params, geometry)?;
        let output = self.output_path(output_dir, name);
        if mode != Mode::Execute {
            // Check and update read the result back.
            Dataset::check_readable(&output)?;
        }
        executor.execute(&pipeline, &output)?;

        match mode {
            Mode::Execute => Ok(ScenarioOutcome::Executed(output)),
            Mode::Check => {
                let dataset = Dataset::open(&output)?;
                Ok(ScenarioOutcome::Passed(self.check(name, &dataset)?))
            }
            Mode::Update => {
                let dataset = Dataset::open(&output)?;
                Ok(ScenarioOutcome::Recorded(self.record(name, &dataset)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};
    use tempfile::TempDir;

    use super::*;
    use crate::dataset::{InvalidDatasetError, Variable};
    use crate::reference::ReferenceStoreError;

    fn dataset(values: &[f64]) -> Dataset {
        let mut d = Dataset::new();
        let data = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap();
        d.insert("B02", Variable::new(vec!["x".into()], data).unwrap());
        d
    }

    fn suite(dir: &TempDir) -> RegressionSuite {
        let mut config = SuiteConfig::default();
        config.reference.path = dir.path().join("groundtruth.json");
        RegressionSuite::open(config, MissingStore::StartEmpty).unwrap()
    }

    #[test]
    fn record_then_check() {
        let dir = TempDir::new().unwrap();
        let mut s = suite(&dir);
        let d = dataset(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(s.record("reduce_time", &d).unwrap(), UpsertOutcome::Inserted);
        assert!(dir.path().join("groundtruth.json").is_file());

        let report = s.check("reduce_time", &d).unwrap();
        assert_eq!(report.checked, 7);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn masked_output_does_not_become_an_empty_reference() {
        let dir = TempDir::new().unwrap();
        let mut s = suite(&dir);
        let err = s.record("mask_scl", &dataset(&[100.0, f64::NAN, 300.0])).unwrap_err();
        assert!(matches!(
            err,
            CubeCheckError::Reference(ReferenceStoreError::NoFiniteStatistics { .. })
        ));
        assert!(!dir.path().join("groundtruth.json").exists());

        s.record("mask_scl", &dataset(&[100.0, 200.0, 300.0])).unwrap();
        // A later masked run keeps every stored value.
        s.record("mask_scl", &dataset(&[100.0, f64::NAN, 300.0])).unwrap_err();
        let err = s.check("mask_scl", &dataset(&[1e6, 2e6, 3e6])).unwrap_err();
        match err {
            CubeCheckError::Assertion(failure) => assert_eq!(failure.mismatches.len(), 7),
            other => panic!("expected an assertion failure, got {other}"),
        }
    }

    #[test]
    fn check_of_unknown_scenario_fails() {
        let dir = TempDir::new().unwrap();
        let s = suite(&dir);
        let err = s.check("reduce_time", &dataset(&[1.0])).unwrap_err();
        assert!(matches!(
            err,
            CubeCheckError::Reference(ReferenceStoreError::ScenarioNotFound { .. })
        ));
    }

    #[test]
    fn check_mode_needs_an_existing_store() {
        let dir = TempDir::new().unwrap();
        let mut config = SuiteConfig::default();
        config.reference.path = dir.path().join("groundtruth.json");
        let err = RegressionSuite::for_mode(config, Mode::Check).unwrap_err();
        assert!(matches!(
            err,
            CubeCheckError::Reference(ReferenceStoreError::NotFound(_))
        ));
    }

    #[test]
    fn execute_mode_ignores_the_store_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groundtruth.json");
        std::fs::write(&path, "not json").unwrap();
        let mut config = SuiteConfig::default();
        config.reference.path = path.clone();

        let s = RegressionSuite::for_mode(config.clone(), Mode::Execute).unwrap();
        assert!(s.store().is_empty());
        assert!(matches!(
            RegressionSuite::for_mode(config.clone(), Mode::Check),
            Err(CubeCheckError::Reference(ReferenceStoreError::Corrupt { .. }))
        ));
        assert!(matches!(
            RegressionSuite::for_mode(config, Mode::Update),
            Err(CubeCheckError::Reference(ReferenceStoreError::Corrupt { .. }))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    /// Counts submissions and writes nothing.
    #[derive(Default)]
    struct CountingExecutor {
        calls: std::cell::Cell<usize>,
    }

    impl RemoteExecutor for CountingExecutor {
        fn execute(
            &self,
            _pipeline: &PipelineDescription,
            _output: &Path,
        ) -> Result<(), crate::executor::RemoteExecutionError> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn unreadable_output_format_fails_before_submitting() {
        let dir = TempDir::new().unwrap();
        let mut config = SuiteConfig::default();
        config.reference.path = dir.path().join("groundtruth.json");
        config.backend.output_format = "tif".to_string();
        let mut s = RegressionSuite::for_mode(config, Mode::Update).unwrap();
        let params: ScenarioParameters = serde_json::from_str(
            r#"{"scenario_name": "reduce_time", "collection_id": "SENTINEL2_L2A"}"#,
        )
        .unwrap();
        let executor = CountingExecutor::default();

        for mode in [Mode::Check, Mode::Update] {
            let err = s
                .run_scenario(&params, &executor, dir.path(), mode)
                .unwrap_err();
            assert!(matches!(
                err,
                CubeCheckError::Dataset(InvalidDatasetError::UnsupportedFormat { .. })
            ));
        }
        assert_eq!(executor.calls.get(), 0);

        // Execute mode never reads the result back.
        let outcome = s
            .run_scenario(&params, &executor, dir.path(), Mode::Execute)
            .unwrap();
        assert_eq!(
            outcome,
            ScenarioOutcome::Executed(dir.path().join("reduce_time.tif"))
        );
        assert_eq!(executor.calls.get(), 1);
    }

    #[test]
    fn output_path_uses_configured_format() {
        let dir = TempDir::new().unwrap();
        let s = suite(&dir);
        assert_eq!(
            s.output_path(Path::new("out"), "mask_scl"),
            Path::new("out").join("mask_scl.nc")
        );
    }
}
