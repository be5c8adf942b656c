//! Persisted reference statistics, keyed by scenario name.
//!
//! The file is a JSON array of `{scenario_name, reference_data}` records. It is
//! read whole, mutated in memory, and rewritten whole. Scenario names are
//! meant to be unique; if a file has duplicates, the first entry wins for
//! both lookup and upsert.

use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::ScenarioStatistics;

#[derive(Error, Debug)]
pub enum ReferenceStoreError {
    #[error("Reference file {0} does not exist")]
    NotFound(PathBuf),

    #[error("Reference file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No reference data for scenario '{scenario}'")]
    ScenarioNotFound { scenario: String },

    #[error("Scenario '{scenario}' has no finite statistics to record; masked outputs need nan_policy = \"skip\"")]
    NoFiniteStatistics { scenario: String },

    #[error("IO error on reference file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't serialise reference data: {0}")]
    Serialise(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub scenario_name: String,
    pub reference_data: ScenarioStatistics,
}

/// What [`ReferenceStore::open`] does when the file doesn't exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingStore {
    Fail,
    StartEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceStore {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a reference file. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceStoreError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReferenceStoreError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ReferenceStoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let entries: Vec<ReferenceEntry> =
            serde_json::from_str(&contents).map_err(|source| ReferenceStoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let mut seen = HashSet::new();
        for e in &entries {
            if !seen.insert(e.scenario_name.as_str()) {
                warn!(
                    "Duplicate scenario '{}' in {}; only the first entry is used",
                    e.scenario_name,
                    path.display()
                );
            }
        }
        info!("Loaded {} reference scenario(s) from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Read a reference file, with an explicit policy for a missing file.
    pub fn open(path: impl AsRef<Path>, missing: MissingStore) -> Result<Self, ReferenceStoreError> {
        match (Self::load(path.as_ref()), missing) {
            (Err(ReferenceStoreError::NotFound(p)), MissingStore::StartEmpty) => {
                info!("{} does not exist yet; starting an empty reference store", p.display());
                Ok(Self::new())
            }
            (result, _) => result,
        }
    }

    pub fn lookup(&self, scenario_name: &str) -> Result<&ScenarioStatistics, ReferenceStoreError> {
        self.entries
            .iter()
            .find(|e| e.scenario_name == scenario_name)
            .map(|e| &e.reference_data)
            .ok_or_else(|| ReferenceStoreError::ScenarioNotFound {
                scenario: scenario_name.to_string(),
            })
    }

    /// Merge `statistics` into the scenario's entry field by field, or append
    /// a new entry if the scenario is unknown.
    ///
    /// NaN and infinite fields are never stored: a merge keeps the old value
    /// of such a field, and a variable with no finite field is left out. If
    /// nothing finite remains the store is not touched.
    pub fn upsert(
        &mut self,
        scenario_name: &str,
        statistics: ScenarioStatistics,
    ) -> Result<UpsertOutcome, ReferenceStoreError> {
        let mut finite = ScenarioStatistics::with_capacity(statistics.len());
        for (variable, stats) in statistics {
            let kept = stats.finite();
            let dropped: Vec<&str> = stats
                .iter()
                .filter(|(s, _)| kept.get(*s).is_none())
                .map(|(s, _)| s.name())
                .collect();
            if !dropped.is_empty() {
                warn!(
                    "{scenario_name} - not storing non-finite {} of '{variable}'",
                    dropped.join(", ")
                );
            }
            if !kept.is_empty() {
                finite.insert(variable, kept);
            }
        }
        if finite.is_empty() {
            return Err(ReferenceStoreError::NoFiniteStatistics {
                scenario: scenario_name.to_string(),
            });
        }

        match self.entries.iter_mut().find(|e| e.scenario_name == scenario_name) {
            Some(entry) => {
                for (variable, newer) in finite {
                    entry
                        .reference_data
                        .entry(variable)
                        .or_default()
                        .merge_from(&newer);
                }
                debug!("Merged new statistics into scenario '{scenario_name}'");
                Ok(UpsertOutcome::Merged)
            }
            None => {
                self.entries.push(ReferenceEntry {
                    scenario_name: scenario_name.to_string(),
                    reference_data: finite,
                });
                debug!("Added scenario '{scenario_name}'");
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Rewrite the whole file. The data goes to a sibling temporary file first
    /// and is renamed over `path`, so readers never see a partial file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReferenceStoreError> {
        let path = path.as_ref();
        let io_err = |source| ReferenceStoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut contents = serde_json::to_string_pretty(&self.entries)?;
        contents.push('\n');

        let tmp_path = temp_path_for(path);
        let written = write_synced(&tmp_path, contents.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, path));
        if let Err(source) = written {
            if let Err(e) = fs::remove_file(&tmp_path) {
                debug!("Couldn't remove {}: {e}", tmp_path.display());
            }
            return Err(io_err(source));
        }
        info!("Wrote {} reference scenario(s) to {}", self.entries.len(), path.display());
        Ok(())
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.scenario_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
