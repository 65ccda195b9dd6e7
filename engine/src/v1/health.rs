use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub models_loaded: usize,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry().await;
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        models_loaded: registry.loaded_count(),
    };

    (StatusCode::OK, Json(response))
}
