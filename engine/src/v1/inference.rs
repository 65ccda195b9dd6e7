use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        Path, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::catalog::ModelFormat;
use crate::dispatch::{self, PredictionInput, PredictionResult};
use crate::error::GatewayError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub features: Option<Vec<f64>>,
    #[serde(default)]
    pub input: Option<Value>,
}

/// `POST /predict/:disease` with a JSON body. Tabular models read
/// `features`, neural models read the raw `input` tensor.
pub async fn predict(
    State(state): State<AppState>,
    Path(disease): Path<String>,
    body: Bytes,
) -> Result<Json<PredictionResult>, GatewayError> {
    let registry = state.registry().await;
    let (entry, _) = registry.resolve(&disease)?;
    let format = entry.descriptor.format;

    let request: PredictRequest = if body.is_empty() {
        PredictRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidInput(format!("Invalid JSON body: {e}")))?
    };

    let input = match format {
        ModelFormat::TabularEstimator => request
            .features
            .map(PredictionInput::Features)
            .ok_or_else(|| missing_field("features"))?,
        ModelFormat::NeuralCheckpoint => request
            .input
            .map(PredictionInput::Tensor)
            .ok_or_else(|| missing_field("input"))?,
    };

    dispatch::predict(&registry, &disease, input, state.settings.inference_timeout)
        .await
        .map(Json)
        .map_err(|e| e.redact(state.settings.expose_internal_errors))
}

/// `POST /predict/:disease/image` with a multipart `file` field.
pub async fn predict_image(
    State(state): State<AppState>,
    Path(disease): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    let registry = state.registry().await;
    registry.resolve(&disease)?;

    let mut multipart = multipart
        .map_err(|e| GatewayError::InvalidInput(format!("Expected a multipart/form-data body: {e}")))?;
    let input = read_upload(&mut multipart).await?;

    dispatch::predict(&registry, &disease, input, state.settings.inference_timeout)
        .await
        .map(Json)
        .map_err(|e| e.redact(state.settings.expose_internal_errors))
}

async fn read_upload(multipart: &mut Multipart) -> Result<PredictionInput, GatewayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(GatewayError::InvalidInput("Empty filename".to_string()));
        }
        let content_type = field.content_type().map(str::to_string);

        let bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::InvalidInput(format!("Failed to read upload: {e}")))?;
        if bytes.is_empty() {
            return Err(GatewayError::InvalidInput("Uploaded file is empty".to_string()));
        }

        info!(file = %file_name, size = bytes.len(), "Received image upload");
        return Ok(PredictionInput::Image {
            bytes,
            content_type,
        });
    }

    Err(GatewayError::InvalidInput("No image file provided".to_string()))
}

fn missing_field(field: &str) -> GatewayError {
    GatewayError::InvalidInput(format!("Missing required field ({field})"))
}
