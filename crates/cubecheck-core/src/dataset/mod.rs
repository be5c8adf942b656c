//! Labelled multi-dimensional datasets produced by the remote backend.
//!
//! A [`Dataset`] holds data variables only; coordinate variables are dropped
//! by the readers. The reader is picked from the file extension.

mod json;
#[cfg(feature = "netcdf")]
mod nc;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::info;
use ndarray::ArrayD;
use thiserror::Error;

pub use json::read_json;

#[derive(Error, Debug)]
pub enum InvalidDatasetError {
    #[error("Couldn't open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse dataset {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Variable '{variable}' has {dims} dimension names but its array is {ndim}-dimensional")]
    DimensionMismatch {
        variable: String,
        dims: usize,
        ndim: usize,
    },

    #[error("Variable '{variable}' declares shape {shape:?} ({expected} samples) but holds {got}")]
    ShapeMismatch {
        variable: String,
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("Dataset {path} has an unsupported format (known extensions: {known})")]
    UnsupportedFormat { path: PathBuf, known: &'static str },

    #[error("No band variables found in {source_name}; available variables: {available:?}")]
    NoMatchingVariables {
        source_name: String,
        available: Vec<String>,
    },

    #[cfg(feature = "netcdf")]
    #[error("netCDF error reading {path}: {source}")]
    Netcdf {
        path: PathBuf,
        source: netcdf::Error,
    },
}

impl InvalidDatasetError {
    /// Attach a variable name to shape errors raised before the name was known.
    pub(crate) fn for_variable(self, name: &str) -> Self {
        match self {
            InvalidDatasetError::DimensionMismatch { dims, ndim, .. } => {
                InvalidDatasetError::DimensionMismatch {
                    variable: name.to_string(),
                    dims,
                    ndim,
                }
            }
            other => other,
        }
    }
}

/// One named n-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    dims: Vec<String>,
    data: ArrayD<f64>,
}

impl Variable {
    pub fn new(dims: Vec<String>, data: ArrayD<f64>) -> Result<Self, InvalidDatasetError> {
        if dims.len() != data.ndim() {
            return Err(InvalidDatasetError::DimensionMismatch {
                variable: String::new(),
                dims: dims.len(),
                ndim: data.ndim(),
            });
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All samples, flattened. Order is irrelevant to the reductions.
    pub fn samples(&self) -> Vec<f64> {
        match self.data.as_slice_memory_order() {
            Some(s) => s.to_vec(),
            None => self.data.iter().copied().collect(),
        }
    }
}

/// Data variables keyed by name, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    source: Option<PathBuf>,
    variables: IndexMap<String, Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a dataset file. `.json` is always supported; `.nc`/`.nc4` need
    /// the `netcdf` feature.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InvalidDatasetError> {
        let path = path.as_ref();
        let mut ds = match Format::of(path)? {
            Format::Json => read_json(path)?,
            #[cfg(feature = "netcdf")]
            Format::Netcdf => nc::read_netcdf(path)?,
        };
        ds.source = Some(path.to_path_buf());
        info!("Read {} variable(s) from {}", ds.len(), path.display());
        Ok(ds)
    }

    /// Fails if [`Dataset::open`] has no reader for this path's extension.
    /// The file itself is not touched.
    pub fn check_readable(path: impl AsRef<Path>) -> Result<(), InvalidDatasetError> {
        Format::of(path.as_ref()).map(|_| ())
    }

    pub fn insert(&mut self, name: impl Into<String>, variable: Variable) -> Option<Variable> {
        self.variables.insert(name.into(), variable)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// File path for messages, or `<in-memory>`.
    pub fn source_name(&self) -> String {
        match &self.source {
            Some(p) => p.display().to_string(),
            None => "<in-memory>".to_string(),
        }
    }
}

enum Format {
    Json,
    #[cfg(feature = "netcdf")]
    Netcdf,
}

impl Format {
    fn of(path: &Path) -> Result<Self, InvalidDatasetError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            #[cfg(feature = "netcdf")]
            Some("nc") | Some("nc4") => Ok(Format::Netcdf),
            _ => Err(InvalidDatasetError::UnsupportedFormat {
                path: path.to_path_buf(),
                known: KNOWN_EXTENSIONS,
            }),
        }
    }
}

#[cfg(feature = "netcdf")]
const KNOWN_EXTENSIONS: &str = "json, nc, nc4";
#[cfg(not(feature = "netcdf"))]
const KNOWN_EXTENSIONS: &str = "json (nc needs the `netcdf` feature)";
