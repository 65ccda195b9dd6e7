pub mod health;
pub mod inference;
pub mod models;

pub use health::{health_check, HealthResponse};
pub use inference::{predict, predict_image, PredictRequest};
pub use models::{list_models, models_status, reload_models, ModelInfo, ModelListResponse};
