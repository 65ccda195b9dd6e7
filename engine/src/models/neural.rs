//! ONNX-backed neural network adapter.

use anyhow::{anyhow, bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{Model, ModelInput, ModelOutput};

/// Loaded ONNX graph. Running a session needs exclusive access, so calls
/// against the same model are serialized.
pub struct NeuralModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl NeuralModel {
    /// Opens `path` as an ONNX graph. With `optimize` off the graph is used
    /// as stored, which tolerates exports the optimizer cannot rewrite.
    pub fn open(path: &Path, optimize: bool, onnx_threads: usize) -> Result<Self> {
        let level = if optimize {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Disable
        };

        let session = Session::builder()?
            .with_optimization_level(level)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX graph from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("graph declares no inputs"))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("graph declares no outputs"))?;

        debug!(input = %input_name, output = %output_name, optimize, "ONNX graph opened");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Model for NeuralModel {
    fn infer(&self, input: &ModelInput) -> Result<ModelOutput> {
        let ModelInput::Tensor(tensor) = input else {
            bail!("neural checkpoint expects a tensor input");
        };

        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = tensor.iter().copied().collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("session lock poisoned: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("graph produced no '{}' output", self.output_name))?;

        let (_, values) = output.try_extract_tensor::<f32>()?;
        let score = values
            .first()
            .copied()
            .ok_or_else(|| anyhow!("graph produced an empty output"))?;

        Ok(ModelOutput::Score(f64::from(score)))
    }
}
