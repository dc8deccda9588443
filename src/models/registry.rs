//! Immutable registry of loaded models

use super::regressor::Regressor;
use super::scaler::StandardScaler;
use crate::error::{LoadError, LoadResult, PredictError, PredictResult};
use crate::schema::FeatureSchema;
use crate::types::prediction::MetricsRecord;
use indexmap::IndexMap;
use std::fmt;

/// A loaded model and its training-time metrics
pub struct ModelEntry {
    pub model: Box<dyn Regressor>,
    pub metrics: Option<MetricsRecord>,
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry")
            .field("kind", &self.model.kind())
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Models keyed by name in registration order, plus the schema and scaler
/// they all share. Built once at startup and never mutated afterwards.
#[derive(Debug)]
pub struct ModelRegistry {
    schema: FeatureSchema,
    scaler: StandardScaler,
    models: IndexMap<String, ModelEntry>,
    default_model: String,
}

impl ModelRegistry {
    pub fn builder(schema: FeatureSchema, scaler: StandardScaler) -> ModelRegistryBuilder {
        ModelRegistryBuilder {
            schema,
            scaler,
            models: IndexMap::new(),
            default_model: None,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Model used when a request does not name one
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Model names in registration order
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.models.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve the requested model, falling back to the default.
    pub fn resolve(&self, requested: Option<&str>) -> PredictResult<(&str, &ModelEntry)> {
        let name = requested.unwrap_or(self.default_model.as_str());
        self.models
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| PredictError::UnknownModel {
                requested: name.to_string(),
                available: self.model_names(),
            })
    }
}

pub struct ModelRegistryBuilder {
    schema: FeatureSchema,
    scaler: StandardScaler,
    models: IndexMap<String, ModelEntry>,
    default_model: Option<String>,
}

impl ModelRegistryBuilder {
    /// Register a model; the first registered model is the default unless overridden
    pub fn model(mut self, name: impl Into<String>, model: Box<dyn Regressor>) -> Self {
        self.models.insert(
            name.into(),
            ModelEntry {
                model,
                metrics: None,
            },
        );
        self
    }

    /// Attach metrics to an already registered model. Returns false if unknown.
    pub fn attach_metrics(&mut self, name: &str, metrics: MetricsRecord) -> bool {
        match self.models.get_mut(name) {
            Some(entry) => {
                entry.metrics = Some(metrics);
                true
            }
            None => false,
        }
    }

    pub fn metrics(mut self, name: &str, metrics: MetricsRecord) -> Self {
        self.attach_metrics(name, metrics);
        self
    }

    pub fn default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = Some(name.into());
        self
    }

    /// Name the default will resolve to, if any model is registered
    pub fn resolved_default(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .or_else(|| self.models.keys().next().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn build(self) -> LoadResult<ModelRegistry> {
        let width = self.schema.len();
        if self.scaler.width() != width {
            return Err(LoadError::ShapeMismatch {
                artifact: "scaler".to_string(),
                expected: self.scaler.width(),
                actual: width,
            });
        }

        for (name, entry) in &self.models {
            if let Some(n) = entry.model.n_features() {
                if n != width {
                    return Err(LoadError::ShapeMismatch {
                        artifact: format!("model '{}'", name),
                        expected: n,
                        actual: width,
                    });
                }
            }
        }

        let default_model = match self.resolved_default() {
            Some(name) => name.to_string(),
            None => return Err(LoadError::NoModels(Default::default())),
        };
        if !self.models.contains_key(&default_model) {
            return Err(LoadError::UnknownDefaultModel {
                name: default_model,
                available: self.models.keys().cloned().collect(),
            });
        }

        Ok(ModelRegistry {
            schema: self.schema,
            scaler: self.scaler,
            models: self.models,
            default_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::regressor::{LinearModel, NativeModel};

    fn linear(intercept: f64, width: usize) -> Box<dyn Regressor> {
        Box::new(NativeModel::Linear(LinearModel {
            intercept,
            coefficients: vec![1.0; width],
        }))
    }

    fn base() -> ModelRegistryBuilder {
        let schema = FeatureSchema::new(["a", "b%"]).unwrap();
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        ModelRegistry::builder(schema, scaler)
    }

    #[test]
    fn test_first_registered_is_default() {
        let registry = base()
            .model("A", linear(1.0, 2))
            .model("B", linear(2.0, 2))
            .build()
            .unwrap();

        assert_eq!(registry.default_model(), "A");
        assert_eq!(registry.model_names(), vec!["A", "B"]);
        let (name, _) = registry.resolve(None).unwrap();
        assert_eq!(name, "A");
        let (name, _) = registry.resolve(Some("B")).unwrap();
        assert_eq!(name, "B");
    }

    #[test]
    fn test_explicit_default() {
        let registry = base()
            .model("A", linear(1.0, 2))
            .model("B", linear(2.0, 2))
            .default_model("B")
            .build()
            .unwrap();
        assert_eq!(registry.default_model(), "B");

        let err = base()
            .model("A", linear(1.0, 2))
            .default_model("Z")
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadError::UnknownDefaultModel { .. }));
    }

    #[test]
    fn test_resolve_unknown_lists_available() {
        let registry = base()
            .model("A", linear(1.0, 2))
            .model("B", linear(2.0, 2))
            .build()
            .unwrap();

        let err = registry.resolve(Some("C")).unwrap_err();
        assert_eq!(
            err,
            PredictError::UnknownModel {
                requested: "C".to_string(),
                available: vec!["A".to_string(), "B".to_string()],
            }
        );
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = base().model("A", linear(1.0, 3)).build().unwrap_err();
        assert!(matches!(err, LoadError::ShapeMismatch { .. }));

        let schema = FeatureSchema::new(["a"]).unwrap();
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let err = ModelRegistry::builder(schema, scaler)
            .model("A", linear(1.0, 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(matches!(base().build(), Err(LoadError::NoModels(_))));
    }

    #[test]
    fn test_metrics_attached() {
        let record = MetricsRecord {
            mse_train: None,
            mse_test: None,
            rmse_train: 1.0,
            rmse_test: 2.0,
            r2_train: 0.9,
            r2_test: 0.8,
            n_total: 10,
            n_train: 8,
            n_test: 2,
        };
        let mut builder = base().model("A", linear(1.0, 2));
        assert!(!builder.attach_metrics("Z", record.clone()));
        let registry = builder.metrics("A", record.clone()).build().unwrap();

        assert_eq!(registry.get("A").unwrap().metrics, Some(record));
    }
}
