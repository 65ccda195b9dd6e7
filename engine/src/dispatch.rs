//! Routes a request to its model, runs it and shapes the verdict.

use axum::body::Bytes;
use ndarray::{ArrayD, Axis};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{Instrument, Span, error, info, info_span};
use uuid::Uuid;

use crate::catalog::{ModelDescriptor, ModelFormat};
use crate::error::GatewayError;
use crate::models::{Model, ModelInput, Probability};
use crate::preprocess;
use crate::registry::ModelRegistry;

/// Raw request payload, before preprocessing.
#[derive(Debug, Clone)]
pub enum PredictionInput {
    Features(Vec<f64>),
    Tensor(Value),
    Image {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

impl PredictionInput {
    fn kind(&self) -> &'static str {
        match self {
            Self::Features(_) => "features",
            Self::Tensor(_) => "tensor",
            Self::Image { .. } => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction: bool,
    pub probability: Probability,
    pub diagnosis: String,
}

/// Runs one prediction against the model registered under `route`.
pub async fn predict(
    registry: &ModelRegistry,
    route: &str,
    input: PredictionInput,
    timeout: Duration,
) -> Result<PredictionResult, GatewayError> {
    let (entry, handle) = registry.resolve(route)?;
    let descriptor = entry.descriptor.clone();
    ensure_accepted(&descriptor, &input)?;

    let span = info_span!(
        "predict",
        request_id = %Uuid::new_v4(),
        model = %descriptor.name,
        input = input.kind(),
    );

    async move {
        let blocking_span = Span::current();
        let task = tokio::task::spawn_blocking(move || {
            let _entered = blocking_span.enter();
            run(&descriptor, handle.as_ref(), input)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                error!(error = %join, "Inference task aborted");
                Err(GatewayError::PredictionFailed(join.to_string()))
            }
            Err(_) => {
                error!(timeout_ms = timeout.as_millis() as u64, "Inference timed out");
                Err(GatewayError::InferenceTimeout(timeout))
            }
        }
    }
    .instrument(span)
    .await
}

fn ensure_accepted(descriptor: &ModelDescriptor, input: &PredictionInput) -> Result<(), GatewayError> {
    let accepted = match (descriptor.format, input) {
        (ModelFormat::TabularEstimator, PredictionInput::Features(_)) => true,
        (ModelFormat::NeuralCheckpoint, PredictionInput::Tensor(_)) => true,
        (ModelFormat::NeuralCheckpoint, PredictionInput::Image { .. }) => descriptor.image.is_some(),
        _ => false,
    };
    if accepted {
        Ok(())
    } else {
        Err(GatewayError::InvalidInput(format!(
            "{} model does not accept {} input",
            descriptor.name,
            input.kind()
        )))
    }
}

// Preprocess, check shape, infer, label. Runs on the blocking pool.
fn run(
    descriptor: &ModelDescriptor,
    model: &dyn Model,
    input: PredictionInput,
) -> Result<PredictionResult, GatewayError> {
    let model_input = prepare(descriptor, model, input)?;

    let output = model.infer(&model_input).map_err(|e| {
        error!(error = %format!("{e:#}"), "Model inference failed");
        GatewayError::PredictionFailed(format!("{e:#}"))
    })?;
    let normalized = output.normalize(descriptor.threshold);

    info!(prediction = normalized.positive, "Prediction complete");

    Ok(PredictionResult {
        prediction: normalized.positive,
        probability: normalized.probability,
        diagnosis: descriptor.diagnosis.label(normalized.positive).to_string(),
    })
}

fn prepare(
    descriptor: &ModelDescriptor,
    model: &dyn Model,
    input: PredictionInput,
) -> Result<ModelInput, GatewayError> {
    match input {
        PredictionInput::Features(features) => {
            let expected = descriptor
                .input_shape
                .as_ref()
                .map(|shape| shape.iter().product::<usize>())
                .or_else(|| model.feature_count());
            if let Some(expected) = expected {
                if features.len() != expected {
                    return Err(GatewayError::ShapeMismatch {
                        expected: vec![expected],
                        actual: vec![features.len()],
                    });
                }
            }
            Ok(ModelInput::Features(preprocess::feature_row(features)?))
        }
        PredictionInput::Tensor(value) => {
            let tensor = preprocess::tensor_from_json(&value)?;
            Ok(ModelInput::Tensor(batched(tensor, descriptor.input_shape.as_deref())?))
        }
        PredictionInput::Image {
            bytes,
            content_type,
        } => {
            let spec = descriptor.image.as_ref().ok_or_else(|| {
                GatewayError::InvalidInput(format!("{} model does not accept images", descriptor.name))
            })?;
            info!(
                size = bytes.len(),
                content_type = content_type.as_deref().unwrap_or("unknown"),
                "Processing uploaded image"
            );
            let tensor = preprocess::image_tensor(&bytes, spec)?;
            if let Some(expected) = descriptor.input_shape.as_deref() {
                if &tensor.shape()[1..] != expected {
                    return Err(GatewayError::ShapeMismatch {
                        expected: expected.to_vec(),
                        actual: tensor.shape()[1..].to_vec(),
                    });
                }
            }
            Ok(ModelInput::Tensor(tensor))
        }
    }
}

// Accepts either the declared shape or the declared shape with a batch of one.
fn batched(tensor: ArrayD<f32>, expected: Option<&[usize]>) -> Result<ArrayD<f32>, GatewayError> {
    let Some(expected) = expected else {
        return Ok(tensor);
    };
    let shape = tensor.shape();
    if shape == expected {
        return Ok(tensor.insert_axis(Axis(0)));
    }
    if shape.len() == expected.len() + 1 && shape[0] == 1 && &shape[1..] == expected {
        return Ok(tensor);
    }
    Err(GatewayError::ShapeMismatch {
        expected: expected.to_vec(),
        actual: shape.to_vec(),
    })
}
