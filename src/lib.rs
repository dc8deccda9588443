//! Thesis Score Service Library
//!
//! Predicts a thesis quality score from loosely typed rubric metrics:
//! raw request values are normalized against a fixed feature schema,
//! standardized, and fed to one of several pre-trained regression models.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod schema;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{LoadError, PredictError};
pub use models::inference::{predict, InferencePipeline};
pub use models::{ArtifactLoader, ModelRegistry};
pub use normalizer::normalize;
pub use schema::FeatureSchema;
pub use types::{PredictionResult, RawRequest, RawValue};
