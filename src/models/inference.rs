//! Inference pipeline: normalize, scale, predict

use super::registry::ModelRegistry;
use crate::config::ExtraColumnsPolicy;
use crate::error::{PredictError, PredictResult};
use crate::normalizer::normalize;
use crate::types::prediction::{round_prediction, PredictionResult};
use crate::types::request::RawRequest;
use std::sync::Arc;
use tracing::{debug, warn};

/// Run one prediction against a registry.
///
/// `requested_model` takes precedence over the request's own `"model"` key;
/// with neither, the registry default is used.
pub fn predict(
    raw: &RawRequest,
    registry: &ModelRegistry,
    requested_model: Option<&str>,
    policy: ExtraColumnsPolicy,
) -> PredictResult<PredictionResult> {
    if raw.is_empty() {
        return Err(PredictError::EmptyRequest);
    }

    let (model_name, entry) = registry.resolve(requested_model.or(raw.model()))?;

    let (row, extra_keys) = normalize(raw, registry.schema());
    let ignored_columns: Vec<String> = extra_keys.into_iter().collect();
    if !ignored_columns.is_empty() {
        match policy {
            ExtraColumnsPolicy::Reject => {
                return Err(PredictError::UnknownColumns {
                    columns: ignored_columns,
                })
            }
            ExtraColumnsPolicy::Warn => {
                warn!(columns = ?ignored_columns, "Unused request columns ignored");
            }
        }
    }

    let scaled = registry.scaler().transform(&row.to_vector());
    let raw_prediction =
        entry
            .model
            .predict(scaled.as_slice())
            .map_err(|e| PredictError::InferenceFailed {
                model: model_name.to_string(),
                reason: format!("{:#}", e),
            })?;

    if !raw_prediction.is_finite() {
        return Err(PredictError::InferenceFailed {
            model: model_name.to_string(),
            reason: format!("non-finite prediction {}", raw_prediction),
        });
    }

    let prediction = round_prediction(raw_prediction);
    debug!(model = %model_name, prediction = prediction, "Prediction complete");

    Ok(PredictionResult {
        model: model_name.to_string(),
        prediction,
        metrics: entry.metrics.clone(),
        columns: registry.schema().to_vec(),
        ignored_columns,
    })
}

/// Shared handle used by request handlers.
///
/// Holds no registry when artifacts failed to load; every prediction then
/// fails with `ModelsUnavailable`.
#[derive(Clone)]
pub struct InferencePipeline {
    registry: Option<Arc<ModelRegistry>>,
    policy: ExtraColumnsPolicy,
}

impl InferencePipeline {
    pub fn new(registry: Arc<ModelRegistry>, policy: ExtraColumnsPolicy) -> Self {
        Self {
            registry: Some(registry),
            policy,
        }
    }

    /// Pipeline for degraded mode
    pub fn unavailable(policy: ExtraColumnsPolicy) -> Self {
        Self {
            registry: None,
            policy,
        }
    }

    pub fn registry(&self) -> Option<&ModelRegistry> {
        self.registry.as_deref()
    }

    pub fn policy(&self) -> ExtraColumnsPolicy {
        self.policy
    }

    pub fn is_available(&self) -> bool {
        self.registry.is_some()
    }

    pub fn predict(
        &self,
        raw: &RawRequest,
        requested_model: Option<&str>,
    ) -> PredictResult<PredictionResult> {
        if raw.is_empty() {
            return Err(PredictError::EmptyRequest);
        }
        let registry = self.registry().ok_or(PredictError::ModelsUnavailable)?;
        predict(raw, registry, requested_model, self.policy)
    }

    /// Parse an HTTP body and predict. The body is validated before the
    /// registry is consulted.
    pub fn predict_payload(&self, body: &[u8]) -> PredictResult<PredictionResult> {
        let raw = RawRequest::from_slice(body)?;
        self.predict(&raw, None)
    }
}
