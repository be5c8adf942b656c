//! Declarative pipeline descriptions handed to the remote backend.
//!
//! A scenario lists [`Operation`]s as written in the scenario file. Building a
//! [`PipelineDescription`] resolves them into [`Step`]s: kernels become explicit
//! weight matrices, BAP settings become a full parameter set, and steps that
//! need the scenario geometry are checked for it.

pub mod bap;
pub mod kernel;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenario::ScenarioParameters;
pub use bap::{BapParameters, BapStep, BapWeights};
pub use kernel::{Kernel, KernelSpec};

pub const DEFAULT_DESCRIPTION: &str = "benchmarking-creo";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Scenario '{scenario}': {process} needs a geometry_file")]
    MissingGeometry {
        scenario: String,
        process: &'static str,
    },

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Invalid spatial resolution {0}")]
    InvalidResolution(f64),

    #[error("BAP weights must be non-negative with a positive sum")]
    InvalidWeights,

    #[error("Mask class list is empty")]
    EmptyMaskClasses,

    #[error("Invalid spatial extent: west {west} / east {east}, south {south} / north {north}")]
    InvalidSpatialExtent {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },

    #[error("Temporal extent ends ({end}) before it starts ({start})")]
    InvalidTemporalExtent { start: String, end: String },
}

fn default_crs() -> u32 {
    4326
}

/// Bounding box in the given EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpatialExtent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    #[serde(default = "default_crs", alias = "espg", alias = "epsg")]
    pub crs: u32,
}

impl SpatialExtent {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let finite = [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.west >= self.east || self.south >= self.north {
            return Err(PipelineError::InvalidSpatialExtent {
                west: self.west,
                south: self.south,
                east: self.east,
                north: self.north,
            });
        }
        Ok(())
    }
}

/// `["YYYY-MM-DD", "YYYY-MM-DD"]`, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalExtent(pub String, pub String);

impl TemporalExtent {
    pub fn start(&self) -> &str {
        &self.0
    }

    pub fn end(&self) -> &str {
        &self.1
    }

    /// ISO dates order lexicographically.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.1 < self.0 {
            return Err(PipelineError::InvalidTemporalExtent {
                start: self.0.clone(),
                end: self.1.clone(),
            });
        }
        Ok(())
    }
}

fn mean() -> String {
    "mean".to_string()
}

fn scl() -> String {
    "SCL".to_string()
}

fn default_mask_classes() -> Vec<u8> {
    vec![3, 8, 9]
}

/// A processing step as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "process", rename_all = "snake_case")]
pub enum Operation {
    ResampleSpatial {
        resolution: f64,
        #[serde(default = "mean")]
        method: String,
    },
    ApplyKernel {
        kernel: KernelSpec,
    },
    AggregateSpatial {
        #[serde(default = "mean")]
        reducer: String,
    },
    ReduceDimension {
        dimension: String,
        reducer: String,
    },
    /// Masks pixels whose scene classification is one of `classes`.
    MaskScl {
        #[serde(default = "scl")]
        band: String,
        #[serde(default = "default_mask_classes")]
        classes: Vec<u8>,
    },
    BestAvailablePixel(BapParameters),
}

impl Operation {
    pub fn process(&self) -> &'static str {
        match self {
            Operation::ResampleSpatial { .. } => "resample_spatial",
            Operation::ApplyKernel { .. } => "apply_kernel",
            Operation::AggregateSpatial { .. } => "aggregate_spatial",
            Operation::ReduceDimension { .. } => "reduce_dimension",
            Operation::MaskScl { .. } => "mask_scl",
            Operation::BestAvailablePixel(_) => "best_available_pixel",
        }
    }

    /// Whether the step reads the scenario geometry.
    pub fn needs_geometry(&self) -> bool {
        matches!(
            self,
            Operation::AggregateSpatial { .. } | Operation::BestAvailablePixel(_)
        )
    }

    pub fn resolve(&self) -> Result<Step, PipelineError> {
        Ok(match self {
            Operation::ResampleSpatial { resolution, method } => {
                if !(resolution.is_finite() && *resolution > 0.0) {
                    return Err(PipelineError::InvalidResolution(*resolution));
                }
                Step::ResampleSpatial {
                    resolution: *resolution,
                    method: method.clone(),
                }
            }
            Operation::ApplyKernel { kernel } => Step::ApplyKernel(kernel.build()?),
            Operation::AggregateSpatial { reducer } => Step::AggregateSpatial {
                reducer: reducer.clone(),
            },
            Operation::ReduceDimension { dimension, reducer } => Step::ReduceDimension {
                dimension: dimension.clone(),
                reducer: reducer.clone(),
            },
            Operation::MaskScl { band, classes } => {
                if classes.is_empty() {
                    return Err(PipelineError::EmptyMaskClasses);
                }
                Step::Mask {
                    band: band.clone(),
                    classes: classes.clone(),
                }
            }
            Operation::BestAvailablePixel(p) => Step::BestAvailablePixel(p.resolve()?),
        })
    }
}

/// A resolved step, as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "process", rename_all = "snake_case")]
pub enum Step {
    ResampleSpatial { resolution: f64, method: String },
    ApplyKernel(Kernel),
    /// Reduces over the description's `geometries`.
    AggregateSpatial { reducer: String },
    ReduceDimension { dimension: String, reducer: String },
    Mask { band: String, classes: Vec<u8> },
    BestAvailablePixel(BapStep),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub title: String,
    pub description: String,
    pub collection_id: String,
    #[serde(default)]
    pub temporal_extent: Option<TemporalExtent>,
    #[serde(default)]
    pub spatial_extent: Option<SpatialExtent>,
    #[serde(default)]
    pub bands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometries: Option<serde_json::Value>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub job_options: IndexMap<String, serde_json::Value>,
}

impl PipelineDescription {
    /// Load `collection_id` with nothing applied.
    pub fn new(title: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            collection_id: collection_id.into(),
            temporal_extent: None,
            spatial_extent: None,
            bands: Vec::new(),
            geometries: None,
            steps: Vec::new(),
            job_options: IndexMap::new(),
        }
    }

    /// Build the description of `params`. `geometries` is the loaded
    /// `geometry_file`, if the scenario has one.
    pub fn from_scenario(
        params: &ScenarioParameters,
        geometries: Option<serde_json::Value>,
    ) -> Result<Self, PipelineError> {
        if let Some(extent) = &params.spatial_extent {
            extent.validate()?;
        }
        if let Some(extent) = &params.temporal_extent {
            extent.validate()?;
        }

        let steps = params
            .operations
            .iter()
            .map(|op| {
                if op.needs_geometry() && geometries.is_none() {
                    return Err(PipelineError::MissingGeometry {
                        scenario: params.scenario_name.clone(),
                        process: op.process(),
                    });
                }
                op.resolve()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut description = Self::new(&params.scenario_name, &params.collection_id);
        description.temporal_extent = params.temporal_extent.clone();
        description.spatial_extent = params.spatial_extent;
        description.bands = params.bands.clone();
        description.geometries = geometries;
        description.steps = steps;
        Ok(description)
    }
}
