//! netCDF reader. Decodes `_FillValue`, `scale_factor` and `add_offset` the
//! way CF-aware readers do, and skips coordinate variables.

use std::path::Path;

use log::{debug, warn};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;

use super::{Dataset, InvalidDatasetError, Variable};

fn scalar_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<f64> {
    let value = var.attribute(name)?.value().ok()?;
    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        _ => None,
    }
}

pub(super) fn read_netcdf(path: &Path) -> Result<Dataset, InvalidDatasetError> {
    let nc_err = |source| InvalidDatasetError::Netcdf {
        path: path.to_path_buf(),
        source,
    };
    let file = netcdf::open(path).map_err(nc_err)?;

    let mut ds = Dataset::new();
    for var in file.variables() {
        let name = var.name();
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if dims.iter().any(|d| *d == name) {
            debug!("Skipping coordinate variable '{name}'");
            continue;
        }
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let mut values: Vec<f64> = match var.get_values::<f64, _>(..) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping non-numeric variable '{name}' in {}: {e}", path.display());
                continue;
            }
        };

        let fill = scalar_attribute(&var, "_FillValue");
        let scale = scalar_attribute(&var, "scale_factor").unwrap_or(1.0);
        let offset = scalar_attribute(&var, "add_offset").unwrap_or(0.0);
        for v in values.iter_mut() {
            if fill == Some(*v) {
                *v = f64::NAN;
            } else {
                *v = *v * scale + offset;
            }
        }

        let expected: usize = shape.iter().product();
        let got = values.len();
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| {
            InvalidDatasetError::ShapeMismatch {
                variable: name.clone(),
                shape: shape.clone(),
                expected,
                got,
            }
        })?;
        let variable = Variable::new(dims, array).map_err(|e| e.for_variable(&name))?;
        ds.insert(name, variable);
    }
    Ok(ds)
}
