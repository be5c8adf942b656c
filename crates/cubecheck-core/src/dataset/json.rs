//! JSON dataset container.
//!
//! ```json
//! { "variables": { "B02": { "dims": ["t", "y", "x"], "shape": [2, 3, 3],
//!                           "data": [ ... row-major, null = NaN ... ] } } }
//! ```

use std::{fs, path::Path};

use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;

use super::{Dataset, InvalidDatasetError, Variable};

fn null_as_nan_vec<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
    let v: Vec<Option<f64>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect())
}

#[derive(Deserialize)]
struct JsonDataset {
    variables: IndexMap<String, JsonVariable>,
}

#[derive(Deserialize)]
struct JsonVariable {
    dims: Vec<String>,
    shape: Vec<usize>,
    #[serde(deserialize_with = "null_as_nan_vec")]
    data: Vec<f64>,
}

pub fn read_json(path: &Path) -> Result<Dataset, InvalidDatasetError> {
    let contents = fs::read_to_string(path).map_err(|source| InvalidDatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: JsonDataset =
        serde_json::from_str(&contents).map_err(|source| InvalidDatasetError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut ds = Dataset::new();
    for (name, var) in raw.variables {
        let expected: usize = var.shape.iter().product();
        let got = var.data.len();
        let shape = var.shape.clone();
        let array = ArrayD::from_shape_vec(IxDyn(&var.shape), var.data).map_err(|_| {
            InvalidDatasetError::ShapeMismatch {
                variable: name.clone(),
                shape,
                expected,
                got,
            }
        })?;
        let variable = Variable::new(var.dims, array).map_err(|e| e.for_variable(&name))?;
        ds.insert(name, variable);
    }
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_variables_and_nulls() {
        let f = write_tmp(
            r#"{"variables": {
                "B02": {"dims": ["y", "x"], "shape": [2, 2], "data": [1.0, null, 3.0, 4.0]},
                "crs": {"dims": [], "shape": [], "data": [0]}
            }}"#,
        );
        let ds = Dataset::open(f.path()).unwrap();
        assert_eq!(ds.len(), 2);
        let b02 = ds.get("B02").unwrap();
        assert_eq!(b02.dims(), ["y", "x"]);
        assert_eq!(b02.data().shape(), &[2, 2]);
        assert!(b02.samples()[1].is_nan());
        assert_eq!(ds.source(), Some(f.path()));
    }

    #[test]
    fn shape_must_match_data() {
        let f = write_tmp(r#"{"variables": {"B02": {"dims": ["x"], "shape": [3], "data": [1, 2]}}}"#);
        let err = read_json(f.path()).unwrap_err();
        assert!(matches!(
            err,
            InvalidDatasetError::ShapeMismatch { expected: 3, got: 2, .. }
        ));
    }

    #[test]
    fn dims_must_match_shape() {
        let f = write_tmp(r#"{"variables": {"B02": {"dims": ["x"], "shape": [1, 2], "data": [1, 2]}}}"#);
        match read_json(f.path()).unwrap_err() {
            InvalidDatasetError::DimensionMismatch { variable, .. } => assert_eq!(variable, "B02"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_and_missing_files() {
        let f = write_tmp("{not json");
        assert!(matches!(
            read_json(f.path()).unwrap_err(),
            InvalidDatasetError::Malformed { .. }
        ));
        assert!(matches!(
            read_json(Path::new("/nonexistent/cube.json")).unwrap_err(),
            InvalidDatasetError::Open { .. }
        ));
    }
}
