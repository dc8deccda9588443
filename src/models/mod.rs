//! Model artifacts and inference components

pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod registry;
pub mod regressor;
pub mod scaler;

pub use inference::InferencePipeline;
pub use loader::ArtifactLoader;
pub use registry::{ModelEntry, ModelRegistry};
pub use regressor::{NativeModel, Regressor};
pub use scaler::StandardScaler;
