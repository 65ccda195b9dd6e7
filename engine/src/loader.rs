//! Model artifact loading with ordered fallback decoding strategies.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::ModelFormat;
use crate::error::LoadError;
use crate::models::{Model, NeuralModel, TabularModel};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A named way of turning a model file into a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Strict UTF-8 JSON.
    Utf8,
    /// Bytes read as ISO-8859-1, for documents written by legacy tooling.
    Latin1,
    /// UTF-8 with invalid sequences replaced.
    LossyUtf8,
    /// ONNX graph with full optimization.
    FullGraph,
    /// ONNX graph exactly as stored.
    GraphOnly,
}

impl DecodeStrategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Latin1 => "latin1",
            Self::LossyUtf8 => "lossy-utf8",
            Self::FullGraph => "full",
            Self::GraphOnly => "graph-only",
        }
    }

    /// Strategies tried, in order, for a given artifact format.
    pub fn for_format(format: ModelFormat) -> &'static [DecodeStrategy] {
        match format {
            ModelFormat::TabularEstimator => &[Self::Utf8, Self::Latin1, Self::LossyUtf8],
            ModelFormat::NeuralCheckpoint => &[Self::FullGraph, Self::GraphOnly],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadAttempt {
    pub strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of loading one artifact: a usable handle or none, plus every
/// attempt that was made.
pub struct LoadReport {
    pub handle: Option<Arc<dyn Model>>,
    pub attempts: Vec<LoadAttempt>,
}

impl LoadReport {
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }
}

/// Loader for model artifacts
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Number of intra-op threads per ONNX session
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Tries each strategy for `format` until one yields a handle. Never
    /// fails: a file no strategy accepts yields a report without a handle.
    pub fn load(&self, model: &str, path: &Path, format: ModelFormat) -> LoadReport {
        let mut attempts = Vec::new();

        for &strategy in DecodeStrategy::for_format(format) {
            match self.attempt(strategy, path) {
                Ok(handle) => {
                    info!(
                        model,
                        path = %path.display(),
                        strategy = strategy.name(),
                        "Model loaded successfully"
                    );
                    attempts.push(LoadAttempt {
                        strategy: strategy.name(),
                        error: None,
                    });
                    return LoadReport {
                        handle: Some(handle),
                        attempts,
                    };
                }
                Err(e) => {
                    warn!(
                        model,
                        path = %path.display(),
                        strategy = strategy.name(),
                        error = %e,
                        "Model decoding attempt failed"
                    );
                    attempts.push(LoadAttempt {
                        strategy: strategy.name(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        warn!(
            model,
            path = %path.display(),
            tried = ?attempts.iter().map(|a| a.strategy).collect::<Vec<_>>(),
            "All decoding strategies failed"
        );
        LoadReport {
            handle: None,
            attempts,
        }
    }

    fn attempt(&self, strategy: DecodeStrategy, path: &Path) -> Result<Arc<dyn Model>, LoadError> {
        match strategy {
            DecodeStrategy::Utf8 => {
                let bytes = std::fs::read(path)?;
                let text = std::str::from_utf8(strip_bom(&bytes))
                    .map_err(|e| LoadError::Encoding(e.to_string()))?;
                Ok(Arc::new(TabularModel::from_json(text)?))
            }
            DecodeStrategy::Latin1 => {
                let bytes = std::fs::read(path)?;
                let text: String = strip_bom(&bytes).iter().map(|&b| char::from(b)).collect();
                Ok(Arc::new(TabularModel::from_json(&text)?))
            }
            DecodeStrategy::LossyUtf8 => {
                let bytes = std::fs::read(path)?;
                let text = String::from_utf8_lossy(strip_bom(&bytes));
                Ok(Arc::new(TabularModel::from_json(&text)?))
            }
            DecodeStrategy::FullGraph | DecodeStrategy::GraphOnly => {
                let optimize = strategy == DecodeStrategy::FullGraph;
                let model = NeuralModel::open(path, optimize, self.onnx_threads)
                    .map_err(|e| LoadError::Deserialization(format!("{e:#}")))?;
                Ok(Arc::new(model))
            }
        }
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}
