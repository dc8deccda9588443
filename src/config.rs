//! Configuration management for the thesis score service

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with request keys that are not feature columns
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtraColumnsPolicy {
    /// Fail the request with `UnknownColumns`
    #[default]
    Reject,
    /// Log the extra keys and predict anyway
    Warn,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Refuse to start when artifacts fail to load (otherwise serve in degraded mode)
    #[serde(default)]
    pub require_artifacts: bool,
}

/// Model artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory containing every artifact below
    #[serde(default = "default_artifacts_dir")]
    pub dir: String,
    /// JSON array with the ordered feature columns
    #[serde(default = "default_columns_file")]
    pub columns_file: String,
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    /// Subdirectory holding one file per model, named after the model
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Optional metrics file
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    /// Explicit registration order; empty means every model file, sorted by name
    #[serde(default)]
    pub models: Vec<String>,
    /// Model used when a request does not name one (default: first registered)
    #[serde(default)]
    pub default_model: Option<String>,
    /// Threads per ONNX session
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

/// Inference behavior
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InferenceConfig {
    #[serde(default)]
    pub extra_columns: ExtraColumnsPolicy,
}

/// Request metrics reporting
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries, 0 disables the reporter
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_artifacts_dir() -> String {
    "artifacts".to_string()
}

fn default_columns_file() -> String {
    "model_columns.json".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_metrics_file() -> String {
    "metrics.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

fn default_report_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            require_artifacts: false,
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            columns_file: default_columns_file(),
            scaler_file: default_scaler_file(),
            models_dir: default_models_dir(),
            metrics_file: default_metrics_file(),
            models: Vec::new(),
            default_model: None,
            onnx_threads: default_onnx_threads(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// `APP__SECTION__KEY` overrides; `APP__ARTIFACTS__MODELS` is a comma-separated list
fn environment(source: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("artifacts.models")
        .source(source)
}

impl AppConfig {
    /// Load configuration from `config/config.toml` (optional) and `APP__*` variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// `env` replaces the process environment when given
    fn load_with_env(path: &Path, env: Option<Map<String, String>>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(environment(env))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
