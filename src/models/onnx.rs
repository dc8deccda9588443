//! ONNX Runtime regressor backend

use super::regressor::Regressor;
use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

/// Outcome of the one-time ONNX Runtime environment setup
static ORT_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

fn init_runtime() -> Result<()> {
    ORT_INIT
        .get_or_init(|| {
            ort::init()
                .commit()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(|e| anyhow!("ONNX Runtime environment init failed: {}", e))
}

/// Regressor exported to ONNX (e.g. an sklearn forest via skl2onnx).
///
/// Expects one float input of shape `[1, n_features]`; the first value of
/// the selected output is the prediction.
pub struct OnnxRegressor {
    name: String,
    /// `Session::run` needs `&mut self`
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxRegressor {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self> {
        let path = path.as_ref();

        init_runtime()?;

        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("variable") || o.name.contains("output"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "variable".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "ONNX model loaded"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        let data: Vec<f32> = features.iter().map(|&x| x as f32).collect();
        let shape = vec![1_i64, data.len() as i64];
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("output '{}' missing", self.output_name))?;
        let (_, data) = output.try_extract_tensor::<f32>()?;
        let value = data
            .first()
            .copied()
            .ok_or_else(|| anyhow!("empty output tensor"))?;

        debug!(model = %self.name, value = value, "ONNX prediction");
        Ok(value as f64)
    }

    fn n_features(&self) -> Option<usize> {
        None
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}
