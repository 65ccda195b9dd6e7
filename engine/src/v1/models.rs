use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::ModelFormat;
use crate::error::GatewayError;
use crate::loader::LoadAttempt;
use crate::registry::{ModelRegistry, RegistryStatus};
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub route: String,
    pub format: ModelFormat,
    pub file: String,
    pub loaded: bool,
    pub file_exists: bool,
    pub loaded_at: Option<DateTime<Utc>>,
    pub accepts_images: bool,
    pub attempts: Vec<LoadAttempt>,
}

#[derive(Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelInfo>,
}

fn describe(registry: &ModelRegistry) -> Vec<ModelInfo> {
    registry
        .entries()
        .iter()
        .map(|entry| ModelInfo {
            name: entry.descriptor.name.clone(),
            route: entry.descriptor.route.clone(),
            format: entry.descriptor.format,
            file: entry.descriptor.file_name.clone(),
            loaded: entry.is_loaded(),
            file_exists: entry.file_exists,
            loaded_at: entry.loaded_at,
            accepts_images: entry.descriptor.image.is_some(),
            attempts: entry.attempts.clone(),
        })
        .collect()
}

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry().await;
    (
        StatusCode::OK,
        Json(ModelListResponse {
            models: describe(&registry),
        }),
    )
}

pub async fn models_status(State(state): State<AppState>) -> Json<RegistryStatus> {
    Json(state.registry().await.status())
}

pub async fn reload_models(
    State(state): State<AppState>,
) -> Result<Json<RegistryStatus>, GatewayError> {
    let registry = state.reload().await?;
    Ok(Json(registry.status()))
}
