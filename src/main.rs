//! Thesis Score Service - Main Entry Point
//!
//! Loads model artifacts and serves score predictions over HTTP.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use thesis_score_service::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ArtifactLoader, InferencePipeline},
    server::{self, AppState},
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("thesis_score_service={}", logging.level))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.logging)?;
    info!("Starting Thesis Score Service");
    info!(
        artifacts = %config.artifacts.dir,
        extra_columns = ?config.inference.extra_columns,
        "Configuration loaded successfully"
    );

    // Load artifacts before binding the listener
    let pipeline = match ArtifactLoader::new(config.artifacts.clone()).load() {
        Ok(registry) => {
            info!(
                "Model registry loaded with {} models: {:?} (default: {})",
                registry.len(),
                registry.model_names(),
                registry.default_model()
            );
            InferencePipeline::new(Arc::new(registry), config.inference.extra_columns)
        }
        Err(e) if config.server.require_artifacts => {
            error!(error = %e, "Failed to load model artifacts");
            bail!("model artifacts are required: {}", e);
        }
        Err(e) => {
            warn!(error = %e, "Failed to load model artifacts, serving in degraded mode");
            InferencePipeline::unavailable(config.inference.extra_columns)
        }
    };

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    server::serve(listener, AppState::new(pipeline, metrics.clone())).await?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
