//! Error types for artifact loading and prediction

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single prediction request.
///
/// Every variant is terminal for the request; nothing is retried because
/// inference is pure and deterministic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    /// The registry failed to load at startup
    #[error("models are not loaded")]
    ModelsUnavailable,

    /// No body, invalid JSON, or a payload with no fields
    #[error("request body is empty or not a JSON object")]
    EmptyRequest,

    #[error("unknown model '{requested}', available: {}", available.join(", "))]
    UnknownModel {
        requested: String,
        available: Vec<String>,
    },

    #[error("unknown columns: {}", columns.join(", "))]
    UnknownColumns { columns: Vec<String> },

    /// The model backend failed or produced a non-finite value
    #[error("inference failed for model '{model}': {reason}")]
    InferenceFailed { model: String, reason: String },
}

impl PredictError {
    /// Stable machine-readable name, used in HTTP payloads and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ModelsUnavailable => "models_unavailable",
            PredictError::EmptyRequest => "empty_request",
            PredictError::UnknownModel { .. } => "unknown_model",
            PredictError::UnknownColumns { .. } => "unknown_columns",
            PredictError::InferenceFailed { .. } => "inference_failed",
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictError::EmptyRequest
                | PredictError::UnknownModel { .. }
                | PredictError::UnknownColumns { .. }
        )
    }
}

/// Failure while building the model registry from artifacts.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("{artifact} expects {expected} features, schema has {actual}")]
    ShapeMismatch {
        artifact: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {artifact}: {reason}")]
    InvalidArtifact { artifact: String, reason: String },

    #[error("invalid model '{name}': {reason}")]
    InvalidModel { name: String, reason: String },

    #[error("no models loaded from {0}")]
    NoModels(PathBuf),

    #[error("default model '{name}' is not among loaded models: {}", available.join(", "))]
    UnknownDefaultModel {
        name: String,
        available: Vec<String>,
    },
}

pub type PredictResult<T> = std::result::Result<T, PredictError>;
pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_message_lists_available() {
        let err = PredictError::UnknownModel {
            requested: "Lasso".to_string(),
            available: vec!["RandomForest".to_string(), "Ridge".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown model 'Lasso', available: RandomForest, Ridge"
        );
        assert_eq!(err.kind(), "unknown_model");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_side_errors() {
        assert!(!PredictError::ModelsUnavailable.is_client_error());
        let err = PredictError::InferenceFailed {
            model: "m".to_string(),
            reason: "nan".to_string(),
        };
        assert!(!err.is_client_error());
        assert_eq!(err.kind(), "inference_failed");
    }
}
