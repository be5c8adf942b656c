//! The scenario catalog: a JSON array of [`ScenarioParameters`].

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{Operation, SpatialExtent, TemporalExtent};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't decode scenarios from {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Scenario '{scenario}' is not in the catalog")]
    ScenarioNotFound { scenario: String },

    #[error("Geometry file {path} is not GeoJSON: {reason}")]
    InvalidGeometry { path: PathBuf, reason: String },
}

/// One scenario: what to load and what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioParameters {
    pub scenario_name: String,
    pub collection_id: String,
    #[serde(default)]
    pub temporal_extent: Option<TemporalExtent>,
    #[serde(default)]
    pub spatial_extent: Option<SpatialExtent>,
    #[serde(default)]
    pub bands: Vec<String>,
    /// GeoJSON file, relative to the geometry directory unless absolute.
    #[serde(default)]
    pub geometry_file: Option<PathBuf>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl ScenarioParameters {
    /// Load this scenario's geometry, if it has one.
    pub fn geometry(
        &self,
        geometry_dir: &Path,
    ) -> Result<Option<serde_json::Value>, ScenarioError> {
        self.geometry_file
            .as_ref()
            .map(|file| load_geometry(&geometry_dir.join(file)))
            .transpose()
    }
}

/// Read a GeoJSON file as an opaque value. It only has to be an object with a
/// string `type` member.
pub fn load_geometry(path: &Path) -> Result<serde_json::Value, ScenarioError> {
    debug!("Reading geometries from {}", path.display());
    let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|source| ScenarioError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    match value.get("type") {
        Some(serde_json::Value::String(_)) => Ok(value),
        Some(_) => Err(ScenarioError::InvalidGeometry {
            path: path.to_path_buf(),
            reason: "'type' is not a string".to_string(),
        }),
        None => Err(ScenarioError::InvalidGeometry {
            path: path.to_path_buf(),
            reason: "expected an object with a 'type' member".to_string(),
        }),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioCatalog {
    scenarios: Vec<ScenarioParameters>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<ScenarioParameters>) -> Self {
        Self { scenarios }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenarios: Vec<ScenarioParameters> =
            serde_json::from_str(&contents).map_err(|source| ScenarioError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let mut seen = HashSet::new();
        for s in &scenarios {
            if !seen.insert(s.scenario_name.as_str()) {
                warn!(
                    "Duplicate scenario '{}' in {}; only the first is used",
                    s.scenario_name,
                    path.display()
                );
            }
        }
        debug!("Read {} scenario(s) from {}", scenarios.len(), path.display());
        Ok(Self { scenarios })
    }

    pub fn lookup(&self, scenario_name: &str) -> Result<&ScenarioParameters, ScenarioError> {
        self.scenarios
            .iter()
            .find(|s| s.scenario_name == scenario_name)
            .ok_or_else(|| ScenarioError::ScenarioNotFound {
                scenario: scenario_name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioParameters> {
        self.scenarios.iter()
    }

    /// Scenario names in file order, duplicates dropped.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.scenarios
            .iter()
            .map(|s| s.scenario_name.as_str())
            .filter(|n| seen.insert(*n))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
