use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised while serving a prediction request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("{0} model is not loaded. Please check server logs and ensure the model file exists.")]
    ModelUnavailable(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Image processing error: {0}")]
    ImageDecode(String),

    #[error("Invalid input shape. Expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Prediction timed out after {} ms", .0.as_millis())]
    InferenceTimeout(Duration),

    #[error("Model reload failed: {0}")]
    ReloadFailed(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownModel(_) => StatusCode::NOT_FOUND,
            Self::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidInput(_) | Self::ImageDecode(_) | Self::ShapeMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::PredictionFailed(_) | Self::ReloadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InferenceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Replaces model-internal error text with a generic message unless
    /// `expose` is set. The caller is expected to have logged the original.
    pub fn redact(self, expose: bool) -> Self {
        match self {
            Self::PredictionFailed(_) if !expose => {
                Self::PredictionFailed("the model could not process this input".to_string())
            }
            other => other,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Reasons a model artifact could not be turned into a handle. These are
/// recorded at startup and never surface directly to a request.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model file not found: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("text decoding failed: {0}")]
    Encoding(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("invalid model document: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            GatewayError::ModelUnavailable("Kidney disease".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::ImageDecode("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::ShapeMismatch {
                expected: vec![128, 128, 3],
                actual: vec![128, 128, 4],
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::InferenceTimeout(Duration::from_millis(5)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn redaction_only_touches_prediction_failures() {
        let hidden = GatewayError::PredictionFailed("tensor rank 3 != 4".into()).redact(false);
        assert!(!hidden.to_string().contains("rank"));

        let shown = GatewayError::PredictionFailed("tensor rank 3 != 4".into()).redact(true);
        assert!(shown.to_string().contains("rank"));

        let input = GatewayError::InvalidInput("Missing required field (features)".into()).redact(false);
        assert_eq!(input.to_string(), "Missing required field (features)");
    }
}
