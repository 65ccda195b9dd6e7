//! Health model gateway
//!
//! Loads a catalogue of disease-prediction models once at startup and serves
//! one prediction endpoint per model over HTTP.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod models;
pub mod preprocess;
pub mod registry;
pub mod v1;

pub use catalog::{Catalog, ModelDescriptor, ModelFormat};
pub use config::{GatewayConfig, Settings};
pub use error::GatewayError;
pub use loader::ModelLoader;
pub use registry::ModelRegistry;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<RwLock<Arc<ModelRegistry>>>,
    pub catalog: Arc<Catalog>,
    pub loader: Arc<ModelLoader>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(registry: ModelRegistry, catalog: Catalog, loader: ModelLoader, settings: Settings) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Arc::new(registry))),
            catalog: Arc::new(catalog),
            loader: Arc::new(loader),
            settings: Arc::new(settings),
        }
    }

    /// Current registry snapshot. Holders keep it alive across a reload.
    pub async fn registry(&self) -> Arc<ModelRegistry> {
        self.registry.read().await.clone()
    }

    /// Rebuilds the registry from the catalogue and swaps it in.
    pub async fn reload(&self) -> Result<Arc<ModelRegistry>, GatewayError> {
        let models_dir = self.registry().await.models_dir().to_path_buf();
        let catalog = self.catalog.clone();
        let loader = self.loader.clone();

        let fresh = tokio::task::spawn_blocking(move || {
            ModelRegistry::initialize(models_dir, &catalog.models, &loader)
        })
        .await
        .map_err(|e| GatewayError::ReloadFailed(e.to_string()))?;

        let fresh = Arc::new(fresh);
        *self.registry.write().await = fresh.clone();
        info!(loaded = fresh.loaded_count(), "Model registry reloaded");
        Ok(fresh)
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/health", get(v1::health_check))
        .route("/models", get(v1::list_models))
        .route("/models/status", get(v1::models_status))
        .route("/models/reload", post(v1::reload_models))
        .route("/predict/:disease", post(v1::predict))
        .route("/predict/:disease/image", post(v1::predict_image))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
