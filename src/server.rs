//! HTTP surface for the inference pipeline

use crate::error::PredictError;
use crate::metrics::PipelineMetrics;
use crate::models::InferencePipeline;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: InferencePipeline,
    pub metrics: Arc<PipelineMetrics>,
}

impl AppState {
    pub fn new(pipeline: InferencePipeline, metrics: Arc<PipelineMetrics>) -> Self {
        Self { pipeline, metrics }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve until Ctrl-C is received
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to install Ctrl-C handler"),
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        match &self {
            PredictError::UnknownModel { available, .. } => {
                body["available"] = json!(available);
            }
            PredictError::UnknownColumns { columns } => {
                body["columns"] = json!(columns);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

async fn predict(State(state): State<AppState>, body: Bytes) -> Response {
    let start = Instant::now();

    match state.pipeline.predict_payload(&body) {
        Ok(result) => {
            state.metrics.record_prediction(&result.model, start.elapsed());
            Json(result).into_response()
        }
        Err(e) => {
            state.metrics.record_failure(e.kind(), start.elapsed());
            if e.is_client_error() {
                warn!(kind = e.kind(), error = %e, "Prediction rejected");
            } else {
                error!(kind = e.kind(), error = %e, "Prediction failed");
            }
            e.into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.pipeline.registry() {
        Some(registry) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "models": registry.len() })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "models": 0 })),
        ),
    }
}

async fn models(State(state): State<AppState>) -> Response {
    let Some(registry) = state.pipeline.registry() else {
        return PredictError::ModelsUnavailable.into_response();
    };

    let models: Vec<Value> = registry
        .iter()
        .map(|(name, entry)| {
            json!({
                "name": name,
                "kind": entry.model.kind(),
                "metrics": entry.metrics,
            })
        })
        .collect();

    Json(json!({
        "default_model": registry.default_model(),
        "models": models,
        "columns": registry.schema().to_vec(),
        "extra_columns": state.pipeline.policy(),
    }))
    .into_response()
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.metrics.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtraColumnsPolicy;
    use crate::models::regressor::{LinearModel, NativeModel};
    use crate::models::{ModelRegistry, StandardScaler};
    use crate::schema::FeatureSchema;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn registry() -> ModelRegistry {
        let schema = FeatureSchema::new(["a", "b%"]).unwrap();
        let scaler = StandardScaler::new(vec![1.0, 0.25], vec![0.5, 0.25]).unwrap();
        ModelRegistry::builder(schema, scaler)
            .model(
                "A",
                Box::new(NativeModel::Linear(LinearModel {
                    intercept: 10.0,
                    coefficients: vec![1.0, 2.0],
                })),
            )
            .model(
                "B",
                Box::new(NativeModel::Linear(LinearModel {
                    intercept: 20.0,
                    coefficients: vec![0.0, 0.0],
                })),
            )
            .build()
            .unwrap()
    }

    fn app() -> (Router, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = InferencePipeline::new(Arc::new(registry()), ExtraColumnsPolicy::Reject);
        (router(AppState::new(pipeline, metrics.clone())), metrics)
    }

    fn degraded() -> Router {
        let pipeline = InferencePipeline::unavailable(ExtraColumnsPolicy::Reject);
        router(AppState::new(pipeline, Arc::new(PipelineMetrics::new())))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_predict(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_predict_ok() {
        let (app, metrics) = app();
        let (status, body) = send(app, post_predict(r#"{"a": "1,5", "b%": "50%"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "A");
        assert_eq!(body["prediction"], 13.0);
        assert_eq!(body["columns"], json!(["a", "b%"]));
        assert!(body.get("ignored_columns").is_none());
        assert_eq!(metrics.get_predictions_by_model().get("A"), Some(&1));
    }

    #[tokio::test]
    async fn test_predict_selects_model() {
        let (app, _) = app();
        let (status, body) = send(app, post_predict(r#"{"a": 1, "model": "B"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "B");
        assert_eq!(body["prediction"], 20.0);
    }

    #[tokio::test]
    async fn test_predict_unknown_model() {
        let (app, metrics) = app();
        let (status, body) = send(app, post_predict(r#"{"a": 1, "model": "C"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_model");
        assert_eq!(body["available"], json!(["A", "B"]));
        assert_eq!(metrics.get_failures_by_kind().get("unknown_model"), Some(&1));
    }

    #[tokio::test]
    async fn test_predict_unknown_columns() {
        let (app, _) = app();
        let (status, body) = send(app, post_predict(r#"{"a": 1, "extra": 2}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_columns");
        assert_eq!(body["columns"], json!(["extra"]));
    }

    #[tokio::test]
    async fn test_predict_empty_body() {
        for payload in ["", "null", "{}", "not json"] {
            let (app, _) = app();
            let (status, body) = send(app, post_predict(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "empty_request");
        }
    }

    #[tokio::test]
    async fn test_degraded_mode() {
        let (status, body) = send(degraded(), post_predict(r#"{"a": 1}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "models_unavailable");

        // empty body still reported as a client error
        let (status, body) = send(degraded(), post_predict("")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "empty_request");

        let (status, body) = send(degraded(), get_request("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");
    }

    #[tokio::test]
    async fn test_health_and_models() {
        let (app, _) = app();
        let (status, body) = send(app.clone(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models"], 2);

        let (status, body) = send(app, get_request("/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["default_model"], "A");
        assert_eq!(body["models"][1]["name"], "B");
        assert_eq!(body["models"][0]["kind"], "linear");
        assert_eq!(body["columns"], json!(["a", "b%"]));
        assert_eq!(body["extra_columns"], "reject");
    }

    #[tokio::test]
    async fn test_stats_counts_requests() {
        let (app, _) = app();
        send(app.clone(), post_predict(r#"{"a": 1}"#)).await;
        send(app.clone(), post_predict("")).await;

        let (status, body) = send(app, get_request("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests_total"], 2);
        assert_eq!(body["predictions_ok"], 1);
        assert_eq!(body["failures_by_kind"]["empty_request"], 1);
        assert!(body["started_at"].is_string());
    }
}
