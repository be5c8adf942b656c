//! Convolution kernels for `apply_kernel` steps.
//!
//! Kernels are built locally and shipped as explicit weight matrices; the
//! convolution itself runs remotely. Both sides must be odd.

use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Largest accepted side length. Bounds the weight matrix shipped with a job.
pub const MAX_KERNEL_SIZE: usize = 1001;

/// An explicit kernel: `weights` are multiplied by `factor` when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    pub weights: Vec<Vec<f64>>,
    pub factor: f64,
}

impl Kernel {
    pub fn rows(&self) -> usize {
        self.weights.len()
    }

    pub fn cols(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    /// Sum of `weights · factor`.
    pub fn effective_sum(&self) -> f64 {
        self.weights.iter().flatten().sum::<f64>() * self.factor
    }
}

fn one() -> f64 {
    1.0
}

/// Kernel as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelSpec {
    /// `size × size` ones with factor `1 / size²` (a box mean).
    Uniform { size: usize },
    /// Normalised 2-D Gaussian, the outer product of a 1-D Gaussian window.
    Gaussian { size: usize, std: f64 },
    Weights {
        weights: Vec<Vec<f64>>,
        #[serde(default = "one")]
        factor: f64,
    },
}

impl KernelSpec {
    pub fn build(&self) -> Result<Kernel, PipelineError> {
        match self {
            KernelSpec::Uniform { size } => uniform_kernel(*size),
            KernelSpec::Gaussian { size, std } => gaussian_kernel(*size, *std),
            KernelSpec::Weights { weights, factor } => {
                let kernel = Kernel {
                    weights: weights.clone(),
                    factor: *factor,
                };
                validate(&kernel)?;
                Ok(kernel)
            }
        }
    }
}

fn check_size(size: usize) -> Result<(), PipelineError> {
    if size == 0 || size % 2 == 0 {
        return Err(PipelineError::InvalidKernel(format!(
            "kernel size must be odd and positive, got {size}"
        )));
    }
    if size > MAX_KERNEL_SIZE {
        return Err(PipelineError::InvalidKernel(format!(
            "kernel size {size} exceeds the maximum of {MAX_KERNEL_SIZE}"
        )));
    }
    Ok(())
}

fn validate(kernel: &Kernel) -> Result<(), PipelineError> {
    let rows = kernel.rows();
    let cols = kernel.cols();
    check_size(rows)?;
    check_size(cols)?;
    if kernel.weights.iter().any(|r| r.len() != cols) {
        return Err(PipelineError::InvalidKernel(
            "kernel rows have different lengths".into(),
        ));
    }
    if !kernel.factor.is_finite() || kernel.weights.iter().flatten().any(|w| !w.is_finite()) {
        return Err(PipelineError::InvalidKernel(
            "kernel weights and factor must be finite".into(),
        ));
    }
    Ok(())
}

pub fn uniform_kernel(size: usize) -> Result<Kernel, PipelineError> {
    check_size(size)?;
    Ok(Kernel {
        weights: vec![vec![1.0; size]; size],
        factor: 1.0 / (size * size) as f64,
    })
}

/// Symmetric Gaussian window of length `m`, peak 1 at the centre:
/// `w[n] = exp(-½ ((n - (m-1)/2) / std)²)`.
pub fn gaussian_window(m: usize, std: f64) -> Vec<f64> {
    let centre = (m as f64 - 1.0) / 2.0;
    (0..m)
        .map(|n| {
            let x = (n as f64 - centre) / std;
            (-0.5 * x * x).exp()
        })
        .collect()
}

/// `size × size` Gaussian kernel normalised so the weights sum to 1.
pub fn gaussian_kernel(size: usize, std: f64) -> Result<Kernel, PipelineError> {
    check_size(size)?;
    if !(std.is_finite() && std > 0.0) {
        return Err(PipelineError::InvalidKernel(format!(
            "Gaussian std must be positive, got {std}"
        )));
    }
    let window = gaussian_window(size, std);
    let mut weights: Vec<Vec<f64>> = window
        .iter()
        .map(|&a| window.iter().map(|&b| a * b).collect())
        .collect();
    let total: f64 = weights.iter().flatten().sum();
    for w in weights.iter_mut().flatten() {
        *w /= total;
    }
    Ok(Kernel {
        weights,
        factor: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn uniform_kernel_is_a_box_mean() {
        let k = uniform_kernel(11).unwrap();
        assert_eq!((k.rows(), k.cols()), (11, 11));
        assert_abs_diff_eq!(k.factor, 1.0 / 121.0);
        assert_abs_diff_eq!(k.effective_sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_window_peaks_at_centre() {
        let w = gaussian_window(5, 1.0);
        assert_abs_diff_eq!(w[2], 1.0);
        assert_abs_diff_eq!(w[1], (-0.5f64).exp());
        assert_abs_diff_eq!(w[0], w[4]);
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(151, 1.0).unwrap();
        assert_abs_diff_eq!(k.effective_sum(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(k.weights[10][20], k.weights[20][10]);
        assert_abs_diff_eq!(k.weights[0][0], k.weights[150][150]);
        let centre = k.weights[75][75];
        assert!(k.weights.iter().flatten().all(|&w| w <= centre));
    }

    #[test]
    fn even_or_empty_sizes_are_rejected() {
        assert!(uniform_kernel(0).is_err());
        assert!(uniform_kernel(4).is_err());
        assert!(gaussian_kernel(3, 0.0).is_err());
        let ragged = KernelSpec::Weights {
            weights: vec![vec![1.0, 1.0, 1.0], vec![1.0], vec![1.0, 1.0, 1.0]],
            factor: 1.0,
        };
        assert!(ragged.build().is_err());
    }

    #[test]
    fn oversized_kernels_are_rejected_before_allocating() {
        assert!(uniform_kernel(MAX_KERNEL_SIZE).is_ok());
        assert!(matches!(
            uniform_kernel(MAX_KERNEL_SIZE + 2),
            Err(PipelineError::InvalidKernel(_))
        ));
        let huge = KernelSpec::Uniform {
            size: (1usize << 33) + 1,
        };
        assert!(matches!(huge.build(), Err(PipelineError::InvalidKernel(_))));
        assert!(gaussian_kernel(usize::MAX, 1.0).is_err());
    }

    #[test]
    fn kernel_deserialises_from_scenario_json() {
        let written: KernelSpec = serde_json::from_str(r#"{"uniform": {"size": 101}}"#).unwrap();
        assert_eq!(written, KernelSpec::Uniform { size: 101 });
        let written: KernelSpec =
            serde_json::from_str(r#"{"weights": {"weights": [[0, 1, 0], [1, 1, 1], [0, 1, 0]]}}"#)
                .unwrap();
        let k = written.build().unwrap();
        assert_eq!(k.factor, 1.0);
        assert_abs_diff_eq!(k.effective_sum(), 5.0);
    }
}
