//! Model adapters. Every loaded artifact is wrapped once, at load time, behind
//! [`Model`].

pub mod neural;
pub mod tabular;

use ndarray::{Array2, ArrayD};
use serde::Serialize;

pub use neural::NeuralModel;
pub use tabular::TabularModel;

/// Preprocessed input ready for a model.
#[derive(Debug, Clone)]
pub enum ModelInput {
    /// One row of features, shape `(1, N)`.
    Features(Array2<f64>),
    /// Batched tensor, leading dimension 1.
    Tensor(ArrayD<f32>),
}

impl ModelInput {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Features(row) => row.shape().to_vec(),
            Self::Tensor(tensor) => tensor.shape().to_vec(),
        }
    }
}

/// What a model produced, before the decision rule is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A classifier's predicted label and per-class probability distribution.
    Classes { positive: bool, probabilities: Vec<f64> },
    /// A single raw score, typically a sigmoid activation.
    Score(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Probability {
    Score(f64),
    PerClass(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOutput {
    pub positive: bool,
    pub probability: Probability,
}

impl ModelOutput {
    /// Classifiers keep their own label and distribution; raw scores are
    /// compared against `threshold` (inclusive).
    pub fn normalize(self, threshold: f64) -> NormalizedOutput {
        match self {
            Self::Classes {
                positive,
                probabilities,
            } => NormalizedOutput {
                positive,
                probability: Probability::PerClass(probabilities),
            },
            Self::Score(score) => NormalizedOutput {
                positive: score >= threshold,
                probability: Probability::Score(score),
            },
        }
    }
}

/// A ready-to-use model handle. Implementations must be deterministic.
pub trait Model: Send + Sync {
    /// Number of features the model was trained on, when the artifact says so.
    fn feature_count(&self) -> Option<usize> {
        None
    }

    fn infer(&self, input: &ModelInput) -> anyhow::Result<ModelOutput>;
}
