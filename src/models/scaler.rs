//! Standardization fitted offline and frozen for serving

use crate::error::{LoadError, LoadResult};
use crate::normalizer::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-column standardization: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Build from frozen statistics. A zero or non-finite scale is stored as 1.0.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> LoadResult<Self> {
        if mean.len() != scale.len() {
            return Err(LoadError::ShapeMismatch {
                artifact: "scaler scale".to_string(),
                expected: mean.len(),
                actual: scale.len(),
            });
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(LoadError::InvalidArtifact {
                artifact: "scaler".to_string(),
                reason: "mean contains non-finite values".to_string(),
            });
        }

        let scale = scale
            .into_iter()
            .map(|s| if s.is_finite() && s != 0.0 { s } else { 1.0 })
            .collect();

        Ok(Self { mean, scale })
    }

    /// Load from a JSON artifact `{"mean": [...], "scale": [...]}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: StandardScaler =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(parsed.mean, parsed.scale)
    }

    /// Number of columns the scaler was fitted on
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardize a vector. Width is checked when the registry is built.
    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        FeatureVector::new(self.transform_slice(features.as_slice()))
    }

    pub fn transform_slice(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&m, &s))| (x - m) / s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::new(vec![1.0, 10.0], vec![2.0, 5.0]).unwrap();
        let out = scaler.transform(&FeatureVector::new(vec![3.0, 0.0]));
        assert_eq!(out.as_slice(), &[1.0, -2.0]);
    }

    #[test]
    fn test_zero_scale_only_centers() {
        let scaler = StandardScaler::new(vec![4.0], vec![0.0]).unwrap();
        assert_eq!(scaler.scale(), &[1.0]);
        assert_eq!(scaler.transform_slice(&[6.0]), vec![2.0]);
    }

    #[test]
    fn test_shape_checks() {
        assert!(matches!(
            StandardScaler::new(vec![0.0, 0.0], vec![1.0]),
            Err(LoadError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            StandardScaler::new(vec![f64::NAN], vec![1.0]),
            Err(LoadError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        fs::write(&path, r#"{"mean": [0.5], "scale": [0.25]}"#).unwrap();

        let scaler = StandardScaler::from_file(&path).unwrap();
        assert_eq!(scaler.width(), 1);
        assert_eq!(scaler.transform_slice(&[1.0]), vec![2.0]);

        fs::write(&path, "{").unwrap();
        assert!(matches!(
            StandardScaler::from_file(&path),
            Err(LoadError::Parse { .. })
        ));
    }
}
