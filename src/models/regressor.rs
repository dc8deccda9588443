//! Regression model backends
//!
//! Every backend maps a scaled feature vector to a scalar score. Native
//! backends are plain data deserialized from JSON; the ONNX backend lives
//! in `models::onnx` behind the `onnx` feature.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A fitted regressor. Implementations must be pure and safe to share across tasks.
pub trait Regressor: Send + Sync {
    /// Predict a score from a scaled feature vector in schema order
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Number of input features the artifact was fitted on, if it declares one
    fn n_features(&self) -> Option<usize>;

    /// Short backend name for logs and listings
    fn kind(&self) -> &'static str;
}

/// Models serialized as JSON artifacts, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeModel {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
}

impl NativeModel {
    /// Structural checks against the schema width
    pub fn validate(&self, width: usize) -> std::result::Result<(), String> {
        match self {
            NativeModel::Linear(m) => m.validate(width),
            NativeModel::TreeEnsemble(m) => m.validate(width),
        }
    }
}

impl Regressor for NativeModel {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        match self {
            NativeModel::Linear(m) => m.predict(features),
            NativeModel::TreeEnsemble(m) => m.predict(features),
        }
    }

    fn n_features(&self) -> Option<usize> {
        match self {
            NativeModel::Linear(m) => Some(m.coefficients.len()),
            NativeModel::TreeEnsemble(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NativeModel::Linear(_) => "linear",
            NativeModel::TreeEnsemble(_) => "tree_ensemble",
        }
    }
}

/// `intercept + coefficients · x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    fn validate(&self, width: usize) -> std::result::Result<(), String> {
        if self.coefficients.len() != width {
            return Err(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                width
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("non-finite coefficients".to_string());
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            bail!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.len()
            );
        }
        let dot: f64 = self
            .coefficients
            .iter()
            .zip(features)
            .map(|(c, x)| c * x)
            .sum();
        Ok(self.intercept + dot)
    }
}

/// Averaged binary regression trees (random-forest style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
}

/// Flat node array; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl TreeEnsemble {
    fn validate(&self, width: usize) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("ensemble has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(width).map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            bail!("ensemble has no trees");
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.predict(features)?;
        }
        Ok(sum / self.trees.len() as f64)
    }
}

impl RegressionTree {
    fn validate(&self, width: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                threshold,
            } = node
            {
                if *feature >= width {
                    return Err(format!("node {} splits on feature {} of {}", i, feature, width));
                }
                if *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {} has a child out of range", i));
                }
                if threshold.is_nan() {
                    return Err(format!("node {} has a NaN threshold", i));
                }
            }
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let mut index = 0;
        // A valid tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let Some(x) = features.get(*feature) else {
                        bail!("feature index {} out of range", feature);
                    };
                    index = if *x <= *threshold { *left } else { *right };
                }
                None => bail!("node index {} out of range", index),
            }
        }
        bail!("tree contains a cycle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn test_linear_predict() {
        let model = NativeModel::Linear(LinearModel {
            intercept: 10.0,
            coefficients: vec![2.0, -1.0],
        });
        assert_eq!(model.predict(&[1.0, 3.0]).unwrap(), 9.0);
        assert_eq!(model.n_features(), Some(2));
        assert_eq!(model.kind(), "linear");
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn test_tree_ensemble_averages() {
        let model = NativeModel::TreeEnsemble(TreeEnsemble {
            trees: vec![stump(0, 0.0, 10.0, 20.0), stump(1, 0.5, 12.0, 18.0)],
        });
        assert_eq!(model.predict(&[-1.0, 1.0]).unwrap(), 14.0);
        assert_eq!(model.predict(&[1.0, 0.0]).unwrap(), 16.0);
        assert!(model.validate(2).is_ok());
        assert!(model.validate(1).is_err());
    }

    #[test]
    fn test_cycle_detected() {
        let tree = RegressionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(tree.predict(&[0.0]).is_err());
    }

    #[test]
    fn test_deserialize_tagged_artifacts() {
        let linear: NativeModel = serde_json::from_str(
            r#"{"kind": "linear", "intercept": 1.5, "coefficients": [0.5]}"#,
        )
        .unwrap();
        assert_eq!(linear.predict(&[2.0]).unwrap(), 2.5);

        let forest: NativeModel = serde_json::from_str(
            r#"{"kind": "tree_ensemble", "trees": [{"nodes": [
                {"feature": 0, "threshold": 1.0, "left": 1, "right": 2},
                {"value": 3.0},
                {"value": 4.0}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(forest.predict(&[2.0]).unwrap(), 4.0);
        assert!(forest.validate(1).is_ok());
    }

    #[test]
    fn test_linear_validation() {
        let model = NativeModel::Linear(LinearModel {
            intercept: 0.0,
            coefficients: vec![1.0, 2.0],
        });
        assert!(model.validate(2).is_ok());
        assert!(model.validate(3).is_err());
    }
}
