#![allow(dead_code)]

use health_model_gateway::catalog::Catalog;
use health_model_gateway::models::{Model, ModelInput, ModelOutput};
use health_model_gateway::registry::{ModelRegistry, RegistryEntry};
use health_model_gateway::{AppState, ModelLoader, Settings};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Eight-feature logistic regression over the Pima diabetes columns.
pub const DIABETES_MODEL: &str = r#"{
    "name": "diabetes",
    "n_features": 8,
    "classes": [0, 1],
    "scaler": {
        "mean": [3.8, 120.9, 69.1, 20.5, 79.8, 32.0, 0.47, 33.2],
        "scale": [3.4, 32.0, 19.4, 16.0, 115.2, 7.9, 0.33, 11.8]
    },
    "estimator": {
        "kind": "logistic_regression",
        "coefficients": [0.41, 1.10, -0.25, 0.01, -0.14, 0.71, 0.31, 0.17],
        "intercept": -0.87
    }
}"#;

pub fn write_diabetes_model(dir: &Path) {
    std::fs::write(dir.join("diabetis_model.json"), DIABETES_MODEL).unwrap();
}

pub fn state_from_dir(dir: &Path) -> AppState {
    let catalog = Catalog::builtin();
    let loader = ModelLoader::new();
    let registry = ModelRegistry::initialize(dir, &catalog.models, &loader);
    AppState::new(registry, catalog, loader, Settings::default())
}

/// Neural stand-in that records how often it was asked to predict.
pub struct CountingModel {
    pub score: f64,
    pub calls: AtomicUsize,
}

impl CountingModel {
    pub fn new(score: f64) -> Arc<Self> {
        Arc::new(Self {
            score,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Model for CountingModel {
    fn infer(&self, _input: &ModelInput) -> anyhow::Result<ModelOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelOutput::Score(self.score))
    }
}

/// Neural stand-in whose every inference fails with `message`.
pub struct FailingModel {
    pub message: &'static str,
}

impl Model for FailingModel {
    fn infer(&self, _input: &ModelInput) -> anyhow::Result<ModelOutput> {
        anyhow::bail!(self.message)
    }
}

/// State with `model` registered under the named catalogue entry and every
/// other catalogue entry absent.
pub fn state_with_model(name: &str, model: Arc<dyn Model>) -> AppState {
    state_with_model_and_settings(name, model, Settings::default())
}

pub fn state_with_model_and_settings(name: &str, model: Arc<dyn Model>, settings: Settings) -> AppState {
    let catalog = Catalog::builtin();
    let entries = catalog
        .models
        .iter()
        .map(|descriptor| {
            let path = Path::new("/models").join(&descriptor.file_name);
            if descriptor.name == name {
                RegistryEntry::loaded(descriptor.clone(), path, model.clone())
            } else {
                RegistryEntry::absent(descriptor.clone(), path, false)
            }
        })
        .collect();
    let registry = ModelRegistry::from_entries("/models", entries);
    AppState::new(registry, catalog, ModelLoader::new(), settings)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "gateway-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
