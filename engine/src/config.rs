use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::Catalog;

/// Command line and environment configuration for the gateway.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Multi-model disease prediction gateway")]
pub struct GatewayConfig {
    /// Interface to bind
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 5002)]
    pub port: u16,

    /// Directory holding one artifact per catalogued model
    #[arg(long, env = "GATEWAY_MODELS_DIR", default_value = "saved_models")]
    pub models_dir: PathBuf,

    /// TOML catalogue replacing the built-in model list
    #[arg(long, env = "GATEWAY_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Intra-op threads per ONNX session
    #[arg(long, env = "GATEWAY_ONNX_THREADS", default_value_t = 1)]
    pub onnx_threads: usize,

    /// Upper bound on a single prediction, preprocessing included
    #[arg(long, env = "GATEWAY_INFERENCE_TIMEOUT_MS", default_value_t = 30_000)]
    pub inference_timeout_ms: u64,

    /// Largest accepted request body
    #[arg(long, env = "GATEWAY_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Include model error text in 500 responses
    #[arg(long, env = "GATEWAY_EXPOSE_INTERNAL_ERRORS", default_value_t = false)]
    pub expose_internal_errors: bool,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::load_from_file(path),
            None => Ok(Catalog::builtin()),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            inference_timeout: Duration::from_millis(self.inference_timeout_ms),
            max_upload_bytes: self.max_upload_bytes,
            expose_internal_errors: self.expose_internal_errors,
        }
    }
}

/// Request-time knobs shared by every handler.
#[derive(Debug, Clone)]
pub struct Settings {
    pub inference_timeout: Duration,
    pub max_upload_bytes: usize,
    pub expose_internal_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inference_timeout: Duration::from_secs(30),
            max_upload_bytes: 10 * 1024 * 1024,
            expose_internal_errors: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::parse_from(["health-model-gateway"]);
        assert_eq!(config.port, 5002);
        assert_eq!(config.models_dir, PathBuf::from("saved_models"));
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5002");

        let settings = config.settings();
        assert_eq!(settings.inference_timeout, Duration::from_secs(30));
        assert!(!settings.expose_internal_errors);
    }

    #[test]
    fn flags_override_defaults() {
        let config = GatewayConfig::parse_from([
            "health-model-gateway",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--inference-timeout-ms",
            "250",
            "--expose-internal-errors",
        ]);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.settings().inference_timeout, Duration::from_millis(250));
        assert!(config.settings().expose_internal_errors);
        assert_eq!(config.load_catalog().unwrap().models.len(), 7);
    }
}
