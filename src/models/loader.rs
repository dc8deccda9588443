//! Artifact loader: builds the model registry from an artifacts directory

use super::registry::{ModelRegistry, ModelRegistryBuilder};
use super::regressor::{NativeModel, Regressor};
use super::scaler::StandardScaler;
use crate::config::ArtifactsConfig;
use crate::error::{LoadError, LoadResult};
use crate::schema::FeatureSchema;
use crate::types::prediction::MetricsRecord;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const JSON_EXTENSION: &str = "json";
const ONNX_EXTENSION: &str = "onnx";

/// Contents of the metrics file: per-model records, or one record for the default model
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricsFile {
    Single(MetricsRecord),
    PerModel(IndexMap<String, MetricsRecord>),
}

/// Loads schema, scaler, models and metrics into a `ModelRegistry`
pub struct ArtifactLoader {
    config: ArtifactsConfig,
}

impl ArtifactLoader {
    pub fn new(config: ArtifactsConfig) -> Self {
        Self { config }
    }

    /// Loader with default file names under `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(ArtifactsConfig {
            dir: dir.as_ref().to_string_lossy().into_owned(),
            ..ArtifactsConfig::default()
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        Path::new(&self.config.dir).join(file)
    }

    /// Load every artifact. Individual model files that fail are skipped;
    /// anything else that fails aborts the load.
    pub fn load(&self) -> LoadResult<ModelRegistry> {
        let schema = FeatureSchema::from_file(self.path(&self.config.columns_file))?;
        let scaler = StandardScaler::from_file(self.path(&self.config.scaler_file))?;
        info!(
            features = schema.len(),
            dir = %self.config.dir,
            "Feature schema and scaler loaded"
        );

        let models_dir = self.path(&self.config.models_dir);
        let mut builder = ModelRegistry::builder(schema.clone(), scaler);

        for (name, path) in self.discover_models(&models_dir)? {
            match self.load_model(&path, &name, schema.len()) {
                Ok(model) => {
                    info!(model = %name, kind = model.kind(), path = %path.display(), "Model loaded");
                    builder = builder.model(name, model);
                }
                Err(e) => {
                    warn!(model = %name, error = %e, "Failed to load model, skipping");
                }
            }
        }

        if builder.is_empty() {
            return Err(LoadError::NoModels(models_dir));
        }

        if let Some(default_model) = &self.config.default_model {
            builder = builder.default_model(default_model.clone());
        }

        self.attach_metrics(&mut builder)?;

        let registry = builder.build()?;
        info!(
            count = registry.len(),
            default_model = %registry.default_model(),
            "Loaded {} models from {}",
            registry.len(),
            models_dir.display()
        );
        Ok(registry)
    }

    /// Model files in registration order: the configured list, or file names sorted
    fn discover_models(&self, models_dir: &Path) -> LoadResult<Vec<(String, PathBuf)>> {
        if !self.config.models.is_empty() {
            let mut found = Vec::new();
            for name in &self.config.models {
                match self.find_model_file(models_dir, name) {
                    Some(path) => found.push((name.clone(), path)),
                    None => warn!(model = %name, dir = %models_dir.display(), "Model file not found"),
                }
            }
            return Ok(found);
        }

        let entries = fs::read_dir(models_dir).map_err(|source| LoadError::Io {
            path: models_dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_model_file(path))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| {
                let name = path.file_stem()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect())
    }

    fn find_model_file(&self, models_dir: &Path, name: &str) -> Option<PathBuf> {
        let json = models_dir.join(format!("{}.{}", name, JSON_EXTENSION));
        if json.is_file() {
            return Some(json);
        }
        let onnx = models_dir.join(format!("{}.{}", name, ONNX_EXTENSION));
        (cfg!(feature = "onnx") && onnx.is_file()).then_some(onnx)
    }

    fn load_model(&self, path: &Path, name: &str, width: usize) -> LoadResult<Box<dyn Regressor>> {
        if path.extension().and_then(|e| e.to_str()) == Some(ONNX_EXTENSION) {
            return self.load_onnx(path, name);
        }

        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: NativeModel = serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model
            .validate(width)
            .map_err(|reason| LoadError::InvalidModel {
                name: name.to_string(),
                reason,
            })?;
        Ok(Box::new(model))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path, name: &str) -> LoadResult<Box<dyn Regressor>> {
        let model = super::onnx::OnnxRegressor::load(path, name, self.config.onnx_threads)
            .map_err(|e| LoadError::InvalidModel {
                name: name.to_string(),
                reason: format!("{:#}", e),
            })?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, _path: &Path, name: &str) -> LoadResult<Box<dyn Regressor>> {
        Err(LoadError::InvalidModel {
            name: name.to_string(),
            reason: "built without the onnx feature".to_string(),
        })
    }

    fn attach_metrics(&self, builder: &mut ModelRegistryBuilder) -> LoadResult<()> {
        let path = self.path(&self.config.metrics_file);
        if !path.exists() {
            info!(path = %path.display(), "No metrics file, predictions will carry no metrics");
            return Ok(());
        }

        let raw = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let metrics: MetricsFile =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;

        match metrics {
            MetricsFile::Single(record) => {
                if let Some(default_model) = builder.resolved_default().map(str::to_string) {
                    builder.attach_metrics(&default_model, record);
                    info!(model = %default_model, "Metrics attached to default model");
                }
            }
            MetricsFile::PerModel(records) => {
                for (name, record) in records {
                    if !builder.attach_metrics(&name, record) {
                        warn!(model = %name, "Metrics for unknown model ignored");
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_model_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(JSON_EXTENSION) => true,
        Some(ONNX_EXTENSION) if cfg!(feature = "onnx") => true,
        Some(ONNX_EXTENSION) => {
            warn!(path = %path.display(), "ONNX model found but the onnx feature is disabled");
            false
        }
        _ => false,
    }
}
