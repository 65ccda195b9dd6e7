//! In-process evaluation of exported tabular classifiers.

use anyhow::{bail, Result};
use serde::Deserialize;

use super::{Model, ModelInput, ModelOutput};
use crate::error::LoadError;

/// On-disk estimator document.
#[derive(Debug, Clone, Deserialize)]
pub struct TabularDocument {
    #[serde(default)]
    pub n_features: Option<usize>,
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    pub estimator: Estimator,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression { coefficients: Vec<f64>, intercept: f64 },
    DecisionForest { trees: Vec<DecisionTree> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A validated estimator, safe to evaluate on any row of the right length.
#[derive(Debug, Clone)]
pub struct TabularModel {
    n_features: usize,
    classes: Vec<i64>,
    scaler: Option<StandardScaler>,
    estimator: Estimator,
}

impl TabularModel {
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let document: TabularDocument =
            serde_json::from_str(text).map_err(|e| LoadError::Deserialization(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_document(document: TabularDocument) -> Result<Self, LoadError> {
        let TabularDocument {
            n_features,
            classes,
            scaler,
            estimator,
        } = document;

        if classes.len() < 2 {
            return Err(LoadError::Invalid(format!(
                "expected at least two classes, found {}",
                classes.len()
            )));
        }

        let inferred = match &estimator {
            Estimator::LogisticRegression { coefficients, .. } => {
                if classes.len() != 2 {
                    return Err(LoadError::Invalid(
                        "logistic regression supports exactly two classes".to_string(),
                    ));
                }
                coefficients.len()
            }
            Estimator::DecisionForest { trees } => {
                if trees.is_empty() {
                    return Err(LoadError::Invalid("decision forest has no trees".to_string()));
                }
                for (index, tree) in trees.iter().enumerate() {
                    validate_tree(tree, classes.len())
                        .map_err(|e| LoadError::Invalid(format!("tree {index}: {e}")))?;
                }
                let mut used = 0;
                for node in trees.iter().flat_map(|t| t.nodes.iter()) {
                    if let TreeNode::Split { feature, .. } = node {
                        let count = feature.checked_add(1).ok_or_else(|| {
                            LoadError::Invalid(format!("feature index {feature} is out of range"))
                        })?;
                        used = used.max(count);
                    }
                }
                used
            }
        };

        let n_features = match n_features {
            Some(declared) if declared < inferred => {
                return Err(LoadError::Invalid(format!(
                    "declares {declared} features but the estimator uses {inferred}"
                )));
            }
            Some(declared)
                if matches!(estimator, Estimator::LogisticRegression { .. })
                    && declared != inferred =>
            {
                return Err(LoadError::Invalid(format!(
                    "declares {declared} features but has {inferred} coefficients"
                )));
            }
            Some(declared) => declared,
            None => inferred,
        };
        if n_features == 0 {
            return Err(LoadError::Invalid("estimator uses no features".to_string()));
        }

        let scaler = match scaler {
            Some(scaler) => {
                if scaler.mean.len() != n_features || scaler.scale.len() != n_features {
                    return Err(LoadError::Invalid(format!(
                        "scaler has {} means and {} scales for {n_features} features",
                        scaler.mean.len(),
                        scaler.scale.len()
                    )));
                }
                // zero variance columns are passed through unscaled
                let scale = scaler
                    .scale
                    .into_iter()
                    .map(|s| if s == 0.0 { 1.0 } else { s })
                    .collect();
                Some(StandardScaler {
                    mean: scaler.mean,
                    scale,
                })
            }
            None => None,
        };

        Ok(Self {
            n_features,
            classes,
            scaler,
            estimator,
        })
    }

    /// Per-class probabilities for one row, in `classes` order.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features {
            bail!(
                "X has {} features, but the estimator is expecting {} features as input",
                row.len(),
                self.n_features
            );
        }

        let scaled: Vec<f64> = match &self.scaler {
            Some(scaler) => row
                .iter()
                .zip(scaler.mean.iter().zip(&scaler.scale))
                .map(|(x, (mean, scale))| (x - mean) / scale)
                .collect(),
            None => row.to_vec(),
        };

        let probabilities = match &self.estimator {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => {
                let z: f64 = coefficients
                    .iter()
                    .zip(&scaled)
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + intercept;
                let positive = 1.0 / (1.0 + (-z).exp());
                vec![1.0 - positive, positive]
            }
            Estimator::DecisionForest { trees } => {
                let mut totals = vec![0.0; self.classes.len()];
                for tree in trees {
                    let leaf = tree.leaf_for(&scaled);
                    let weight: f64 = leaf.iter().sum();
                    for (total, value) in totals.iter_mut().zip(leaf) {
                        *total += value / weight;
                    }
                }
                let count = trees.len() as f64;
                totals.into_iter().map(|t| t / count).collect()
            }
        };

        Ok(probabilities)
    }

}

impl DecisionTree {
    fn leaf_for(&self, row: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }
}

// Children must sit after their parent so traversal always terminates.
fn validate_tree(tree: &DecisionTree, n_classes: usize) -> Result<(), String> {
    if tree.nodes.is_empty() {
        return Err("no nodes".to_string());
    }
    for (index, node) in tree.nodes.iter().enumerate() {
        match node {
            TreeNode::Split { left, right, .. } => {
                for child in [*left, *right] {
                    if child <= index || child >= tree.nodes.len() {
                        return Err(format!("node {index} points to invalid child {child}"));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                if value.len() != n_classes {
                    return Err(format!(
                        "leaf {index} has {} values for {n_classes} classes",
                        value.len()
                    ));
                }
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(format!("leaf {index} has a negative or non-finite value"));
                }
                if value.iter().sum::<f64>() <= 0.0 {
                    return Err(format!("leaf {index} is empty"));
                }
            }
        }
    }
    Ok(())
}

// Lowest index wins ties.
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

impl Model for TabularModel {
    fn feature_count(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn infer(&self, input: &ModelInput) -> Result<ModelOutput> {
        let ModelInput::Features(rows) = input else {
            bail!("tabular estimator expects a feature row");
        };
        let Some(row) = rows.rows().into_iter().next() else {
            bail!("empty feature matrix");
        };
        let row: Vec<f64> = row.to_vec();

        let probabilities = self.predict_proba(&row)?;
        let label = self.classes[argmax(&probabilities)];
        Ok(ModelOutput::Classes {
            positive: label != 0,
            probabilities,
        })
    }
}
