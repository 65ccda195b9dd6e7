//! Model catalogue: which artifacts the gateway expects, how to feed them and
//! how to phrase their verdicts.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Classifier over flat numeric features, stored as a JSON estimator document.
    TabularEstimator,
    /// Neural network graph stored as ONNX.
    NeuralCheckpoint,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TabularEstimator => f.write_str("tabular_estimator"),
            Self::NeuralCheckpoint => f.write_str("neural_checkpoint"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Keep whatever channel count the decoded image has.
    Native,
    /// Force three-channel colour.
    Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_channels")]
    pub channels: ChannelMode,
    /// Reject anything that is not exactly `(height, width, 3)` after preprocessing.
    #[serde(default)]
    pub strict_shape: bool,
}

fn default_channels() -> ChannelMode {
    ChannelMode::Native
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisMapping {
    pub positive: String,
    pub negative: String,
}

impl DiagnosisMapping {
    pub fn new(positive: &str, negative: &str) -> Self {
        Self {
            positive: positive.to_string(),
            negative: negative.to_string(),
        }
    }

    pub fn label(&self, positive: bool) -> &str {
        if positive { &self.positive } else { &self.negative }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// URL slug under `/predict/`. Defaults to `name` with underscores as dashes.
    #[serde(default)]
    pub route: String,
    /// Relative to the models directory.
    pub file_name: String,
    pub format: ModelFormat,
    /// Expected input shape without the batch dimension.
    #[serde(default)]
    pub input_shape: Option<Vec<usize>>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub diagnosis: DiagnosisMapping,
}

fn default_threshold() -> f64 {
    0.5
}

impl ModelDescriptor {
    pub fn tabular(name: &str, file_name: &str, diagnosis: DiagnosisMapping) -> Self {
        Self {
            name: name.to_string(),
            route: default_route(name),
            file_name: file_name.to_string(),
            format: ModelFormat::TabularEstimator,
            input_shape: None,
            image: None,
            threshold: default_threshold(),
            diagnosis,
        }
    }

    pub fn neural(name: &str, file_name: &str, image: ImageSpec, diagnosis: DiagnosisMapping) -> Self {
        Self {
            name: name.to_string(),
            route: default_route(name),
            file_name: file_name.to_string(),
            format: ModelFormat::NeuralCheckpoint,
            input_shape: None,
            image: Some(image),
            threshold: default_threshold(),
            diagnosis,
        }
    }
}

fn default_route(name: &str) -> String {
    name.replace('_', "-")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub models: Vec<ModelDescriptor>,
}

impl Catalog {
    /// The seven disease models the gateway ships with.
    pub fn builtin() -> Self {
        let models = vec![
            ModelDescriptor::tabular(
                "breast_cancer",
                "breast_cancer_model.json",
                DiagnosisMapping::new("Malignant", "Benign"),
            ),
            ModelDescriptor::tabular(
                "heart_disease",
                "heart_disease_model.json",
                DiagnosisMapping::new("Heart Disease Present", "No Heart Disease"),
            ),
            ModelDescriptor::tabular(
                "liver_disease",
                "Liver_Model.json",
                DiagnosisMapping::new("Liver Disease Present", "No Liver Disease"),
            ),
            ModelDescriptor::neural(
                "kidney_disease",
                "kidney_disease_model.onnx",
                ImageSpec {
                    width: 256,
                    height: 256,
                    channels: ChannelMode::Native,
                    strict_shape: false,
                },
                DiagnosisMapping::new("Kidney Disease Present", "No Kidney Disease"),
            ),
            ModelDescriptor::neural(
                "brain_tumor",
                "brain_tumor_model.onnx",
                ImageSpec {
                    width: 128,
                    height: 128,
                    channels: ChannelMode::Rgb,
                    strict_shape: true,
                },
                DiagnosisMapping::new("Brain Tumor Detected", "No Brain Tumor Detected"),
            ),
            ModelDescriptor::tabular(
                "hepatitis",
                "hepatitis_model.json",
                DiagnosisMapping::new("Hepatitis Present", "No Hepatitis"),
            ),
            ModelDescriptor::tabular(
                "diabetes",
                "diabetis_model.json",
                DiagnosisMapping::new("Diabetes Present", "No Diabetes"),
            ),
        ];
        Self { models }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut catalog: Self = toml::from_str(content).context("malformed model catalogue")?;
        catalog.normalize()?;
        Ok(catalog)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalogue {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    fn normalize(&mut self) -> Result<()> {
        let mut names = HashSet::new();
        let mut routes = HashSet::new();

        for model in &mut self.models {
            if model.name.is_empty() {
                bail!("catalogue entry with an empty name");
            }
            if model.route.is_empty() {
                model.route = default_route(&model.name);
            }
            if !names.insert(model.name.clone()) {
                bail!("duplicate model name '{}'", model.name);
            }
            if !routes.insert(model.route.clone()) {
                bail!("duplicate route '{}'", model.route);
            }
            if !(0.0..=1.0).contains(&model.threshold) {
                bail!("model '{}': threshold {} outside [0, 1]", model.name, model.threshold);
            }
            if model.image.is_some() && model.format != ModelFormat::NeuralCheckpoint {
                bail!("model '{}': image input is only supported for neural checkpoints", model.name);
            }
        }
        Ok(())
    }
}
