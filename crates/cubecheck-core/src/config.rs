//! Suite configuration, read from a TOML or JSON file.
//!
//! Everything a run needs is in here and is handed to components explicitly;
//! nothing in the library reads environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compare::Discipline;
use crate::executor::BackendConfig;
use crate::stats::{
    extract::DEFAULT_BAND_PATTERN, BandSelection, ExtractOptions, NanPolicy, MAX_ROUND_DECIMALS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't decode toml structure from {path}:\n{source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Couldn't decode json structure from {path}:\n{source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Config file {0} doesn't have a recognised file extension! Valid extensions are: toml, json")]
    UnknownExtension(PathBuf),

    #[error("Band pattern '{pattern}' is not a valid regex: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Comparison tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("extract.round_decimals must be at most {max}, got {0}", max = MAX_ROUND_DECIMALS)]
    InvalidRoundDecimals(u32),

    #[error("No backend URL configured; set backend.url, pass --backend-url or set CUBECHECK_BACKEND_URL")]
    MissingBackendUrl,

    #[error("backend.command is empty; it must name the job runner program")]
    EmptyCommand,
}

/// `{ pattern = "^B\\d" }` or `{ exclude = ["crs"] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSelectionConfig {
    Pattern(String),
    Exclude(Vec<String>),
}

impl Default for BandSelectionConfig {
    fn default() -> Self {
        BandSelectionConfig::Pattern(DEFAULT_BAND_PATTERN.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    pub band_selection: BandSelectionConfig,
    pub round_decimals: Option<u32>,
    pub nan_policy: NanPolicy,
}

impl ExtractConfig {
    pub fn to_options(&self) -> Result<ExtractOptions, ConfigError> {
        if let Some(d) = self.round_decimals.filter(|d| *d > MAX_ROUND_DECIMALS) {
            return Err(ConfigError::InvalidRoundDecimals(d));
        }
        let selection = match &self.band_selection {
            BandSelectionConfig::Pattern(p) => BandSelection::pattern(p)?,
            BandSelectionConfig::Exclude(names) => BandSelection::exclude(names.iter().cloned()),
        };
        Ok(ExtractOptions {
            selection,
            round_decimals: self.round_decimals,
            nan_policy: self.nan_policy,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceConfig {
    pub path: PathBuf,
    pub comparison: Discipline,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("groundtruth_regression_test.json"),
            comparison: Discipline::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub path: PathBuf,
    pub geometry_dir: PathBuf,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scenarios_regression_test.json"),
            geometry_dir: PathBuf::from("geofiles"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteConfig {
    pub extract: ExtractConfig,
    pub reference: ReferenceConfig,
    pub scenarios: ScenarioConfig,
    pub backend: BackendConfig,
}

impl SuiteConfig {
    /// Parse a `.toml` or `.json` config file. Relative paths inside it are
    /// resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Attempting to parse config file {}", path.display());

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let read = || {
            fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let mut config: SuiteConfig = match ext.as_deref() {
            Some("toml") => toml::from_str(&read()?).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            Some("json") => serde_json::from_str(&read()?).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(ConfigError::UnknownExtension(path.to_path_buf())),
        };

        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Make relative file paths relative to `base`.
    pub fn rebase(&mut self, base: &Path) {
        for p in [
            &mut self.reference.path,
            &mut self.scenarios.path,
            &mut self.scenarios.geometry_dir,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// Checks that don't need the backend. Backend settings are checked when
    /// an executor is built from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Discipline::Relative { tolerance } = self.reference.comparison {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(ConfigError::InvalidTolerance(tolerance));
            }
        }
        self.extract.to_options()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::executor::AuthMethod;

    #[test]
    fn defaults_match_the_regression_suite() {
        let c = SuiteConfig::default();
        assert_eq!(
            c.extract.band_selection,
            BandSelectionConfig::Pattern(r"^B\d".into())
        );
        assert_eq!(c.reference.comparison, Discipline::Relative { tolerance: 0.05 });
        assert_eq!(c.extract.nan_policy, NanPolicy::Propagate);
        assert!(c.extract.round_decimals.is_none());
    }

    #[test]
    fn toml_config_is_parsed_and_rebased() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cubecheck.toml");
        fs::write(
            &path,
            r#"
[extract]
band_selection = { exclude = ["crs"] }
round_decimals = 2
nan_policy = "skip"

[reference]
path = "refs/groundtruth.json"
comparison = { mode = "exact" }

[backend]
url = "https://openeo.example.org/"
auth_method = "client_credentials"
max_poll_time_secs = 60
command = ["run-job", "--quiet"]
job_options = { driver-memory = "2g" }
"#,
        )
        .unwrap();

        let c = SuiteConfig::load(&path).unwrap();
        assert_eq!(
            c.extract.band_selection,
            BandSelectionConfig::Exclude(vec!["crs".into()])
        );
        assert_eq!(c.extract.round_decimals, Some(2));
        assert_eq!(c.extract.nan_policy, NanPolicy::Skip);
        assert_eq!(c.reference.comparison, Discipline::Exact);
        assert_eq!(c.reference.path, dir.path().join("refs/groundtruth.json"));
        assert_eq!(c.scenarios.geometry_dir, dir.path().join("geofiles"));
        assert_eq!(c.backend.url.as_deref(), Some("https://openeo.example.org/"));
        assert_eq!(c.backend.auth_method, AuthMethod::ClientCredentials);
        assert_eq!(c.backend.command, vec!["run-job", "--quiet"]);
        assert_eq!(c.backend.job_options["driver-memory"], "2g");
    }

    #[test]
    fn json_config_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cubecheck.json");
        fs::write(
            &path,
            r#"{"reference": {"comparison": {"mode": "relative", "tolerance": 0.01}}}"#,
        )
        .unwrap();
        let c = SuiteConfig::load(&path).unwrap();
        assert_eq!(c.reference.comparison, Discipline::Relative { tolerance: 0.01 });
    }

    #[test]
    fn bad_values_are_rejected() {
        let dir = TempDir::new().unwrap();

        let path = dir.path().join("neg.toml");
        fs::write(&path, "[reference]\ncomparison = { mode = \"relative\", tolerance = -0.1 }\n").unwrap();
        assert!(matches!(
            SuiteConfig::load(&path),
            Err(ConfigError::InvalidTolerance(_))
        ));

        let path = dir.path().join("decimals.toml");
        fs::write(&path, "[extract]\nround_decimals = 400\n").unwrap();
        assert!(matches!(
            SuiteConfig::load(&path),
            Err(ConfigError::InvalidRoundDecimals(400))
        ));

        let path = dir.path().join("regex.toml");
        fs::write(&path, "[extract]\nband_selection = { pattern = \"B([\" }\n").unwrap();
        assert!(matches!(
            SuiteConfig::load(&path),
            Err(ConfigError::InvalidPattern { .. })
        ));

        let path = dir.path().join("typo.toml");
        fs::write(&path, "[extract]\nround_decimal = 2\n").unwrap();
        assert!(matches!(SuiteConfig::load(&path), Err(ConfigError::Toml { .. })));

        let path = dir.path().join("cubecheck.yaml");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            SuiteConfig::load(&path),
            Err(ConfigError::UnknownExtension(_))
        ));
    }
}
