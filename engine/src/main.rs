use anyhow::{Context, Result};
use clap::Parser;
use health_model_gateway::{router, AppState, GatewayConfig, ModelLoader, ModelRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("health_model_gateway=info,tower_http=info")),
        )
        .init();

    let config = GatewayConfig::parse();
    let catalog = config.load_catalog()?;
    info!(
        models = catalog.models.len(),
        models_dir = %config.models_dir.display(),
        "Catalogue loaded"
    );

    let loader = ModelLoader::with_threads(config.onnx_threads);
    let registry = ModelRegistry::initialize(&config.models_dir, &catalog.models, &loader);
    if registry.loaded_count() == 0 {
        warn!("No models loaded; every prediction route will answer 503");
    }

    let routes: Vec<(String, bool)> = registry
        .entries()
        .iter()
        .map(|e| (e.descriptor.route.clone(), e.descriptor.image.is_some()))
        .collect();

    let state = AppState::new(registry, catalog, loader, config.settings());
    let app = router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!("Health model gateway starting on http://{}", addr);
    info!("Available endpoints:");
    info!("  - GET  /health          - Health check");
    info!("  - GET  /models          - Model details and load attempts");
    info!("  - GET  /models/status   - Loaded and present models");
    info!("  - POST /models/reload   - Reload every model from disk");
    for (route, accepts_images) in routes {
        info!("  - POST /predict/{}", route);
        if accepts_images {
            info!("  - POST /predict/{}/image", route);
        }
    }

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
