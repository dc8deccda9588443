//! Type definitions shared by the normalizer, the pipeline and the server

pub mod prediction;
pub mod request;

pub use prediction::{MetricsRecord, PredictionResult};
pub use request::{RawRequest, RawValue};
