//! Best-Available-Pixel (BAP) composite descriptor.
//!
//! Each observation gets a score from three parts, weighted and averaged:
//!   - distance to cloud: 1 − (cloud mask ⊛ Gaussian kernel)
//!   - date: Gaussian in the day offset from mid-month
//!   - coverage: cloud-free fraction over the scenario geometry
//! and per pixel and month only the best-scoring observation is kept. The
//! scoring runs remotely; this module fixes its parameters.

use serde::{Deserialize, Serialize};

use super::{
    kernel::{gaussian_kernel, Kernel, MAX_KERNEL_SIZE},
    PipelineError,
};

/// SCL classes counted as cloud: cloud shadow, medium/high cloud probability, thin cirrus.
pub const DEFAULT_CLOUD_CLASSES: [u8; 4] = [3, 8, 9, 10];

/// The distance-to-cloud kernel spans 150 pixels at 20 m.
const DTC_REFERENCE_PIXELS: f64 = 150.0;
const DTC_REFERENCE_RESOLUTION: f64 = 20.0;
const DTC_STD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BapWeights {
    pub distance_to_cloud: f64,
    pub date: f64,
    pub coverage: f64,
}

impl Default for BapWeights {
    fn default() -> Self {
        Self {
            distance_to_cloud: 1.0,
            date: 0.8,
            coverage: 0.5,
        }
    }
}

impl BapWeights {
    pub fn sum(&self) -> f64 {
        self.distance_to_cloud + self.date + self.coverage
    }
}

/// Date score `amplitude · exp(-½ ((day − centre_day) · scale)²)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateScore {
    pub centre_day: f64,
    pub scale: f64,
    pub amplitude: f64,
}

impl Default for DateScore {
    fn default() -> Self {
        Self {
            centre_day: 15.0,
            scale: 0.2,
            amplitude: 0.079_788_45,
        }
    }
}

fn default_scl_band() -> String {
    "SCL".to_string()
}

fn default_cloud_classes() -> Vec<u8> {
    DEFAULT_CLOUD_CLASSES.to_vec()
}

/// BAP settings as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BapParameters {
    /// Pixel size in metres; sets the distance-to-cloud kernel size.
    pub spatial_resolution: f64,
    #[serde(default)]
    pub weights: BapWeights,
    #[serde(default = "default_cloud_classes")]
    pub cloud_classes: Vec<u8>,
    #[serde(default = "default_scl_band")]
    pub scl_band: String,
}

/// Fully resolved BAP step, as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BapStep {
    pub scl_band: String,
    pub cloud_classes: Vec<u8>,
    pub weights: BapWeights,
    pub distance_kernel: Kernel,
    pub date_score: DateScore,
    /// Compositing window for the rank mask.
    pub period: String,
}

/// Side length of the distance-to-cloud kernel at `resolution` metres.
pub fn distance_kernel_size(resolution: f64) -> Result<usize, PipelineError> {
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(PipelineError::InvalidResolution(resolution));
    }
    let span = (DTC_REFERENCE_PIXELS * DTC_REFERENCE_RESOLUTION / resolution).floor();
    if span >= MAX_KERNEL_SIZE as f64 {
        return Err(PipelineError::InvalidResolution(resolution));
    }
    let size = span as usize + 1;
    // Gaussian kernels must be odd-sized.
    Ok(if size % 2 == 0 { size + 1 } else { size })
}

impl BapParameters {
    pub fn resolve(&self) -> Result<BapStep, PipelineError> {
        let w = self.weights;
        if [w.distance_to_cloud, w.date, w.coverage]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.sum() <= 0.0
        {
            return Err(PipelineError::InvalidWeights);
        }
        if self.cloud_classes.is_empty() {
            return Err(PipelineError::EmptyMaskClasses);
        }
        let size = distance_kernel_size(self.spatial_resolution)?;
        Ok(BapStep {
            scl_band: self.scl_band.clone(),
            cloud_classes: self.cloud_classes.clone(),
            weights: self.weights,
            distance_kernel: gaussian_kernel(size, DTC_STD)?,
            date_score: DateScore::default(),
            period: "month".to_string(),
        })
    }
}
