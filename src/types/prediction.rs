//! Prediction results and stored model quality metrics

use serde::{Deserialize, Serialize};

/// Quality metrics computed once at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse_train: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse_test: Option<f64>,
    pub rmse_train: f64,
    pub rmse_test: f64,
    pub r2_train: f64,
    pub r2_test: f64,
    pub n_total: usize,
    pub n_train: usize,
    pub n_test: usize,
}

/// Successful prediction for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Name of the model that produced the prediction
    pub model: String,

    /// Predicted total score, rounded to `PREDICTION_DECIMALS`
    pub prediction: f64,

    /// Training-time metrics for the model, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsRecord>,

    /// Feature columns used, in model order
    pub columns: Vec<String>,

    /// Request keys that were not features (only under the warn policy)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_columns: Vec<String>,
}

/// Decimal places kept in presented predictions.
pub const PREDICTION_DECIMALS: i32 = 4;

/// Round half away from zero to `PREDICTION_DECIMALS` places.
pub fn round_prediction(value: f64) -> f64 {
    let factor = 10f64.powi(PREDICTION_DECIMALS);
    let scaled = value * factor;
    // overflows above ~1.8e304
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_prediction() {
        assert_eq!(round_prediction(15.123_449), 15.1234);
        assert_eq!(round_prediction(15.123_46), 15.1235);
        assert_eq!(round_prediction(-2.000_06), -2.0001);
        assert_eq!(round_prediction(7.0), 7.0);
    }

    #[test]
    fn test_round_prediction_huge_values() {
        assert_eq!(round_prediction(1e305), 1e305);
        assert_eq!(round_prediction(-f64::MAX), -f64::MAX);
        assert!(round_prediction(1e300).is_finite());
    }

    #[test]
    fn test_metrics_record_accepts_historical_format() {
        let json = r#"{
            "rmse_train": 1.2, "r2_train": 0.91,
            "rmse_test": 2.4, "r2_test": 0.72,
            "n_total": 120, "n_train": 96, "n_test": 24
        }"#;
        let record: MetricsRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.mse_train, None);
        assert_eq!(record.n_test, 24);

        let out = serde_json::to_value(&record).unwrap();
        assert!(out.get("mse_train").is_none());
    }

    #[test]
    fn test_prediction_result_serialization() {
        let result = PredictionResult {
            model: "Ridge".to_string(),
            prediction: 16.5,
            metrics: None,
            columns: vec!["a".to_string()],
            ignored_columns: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["model"], "Ridge");
        assert_eq!(json["prediction"], 16.5);
        assert!(json.get("metrics").is_none());
        assert!(json.get("ignored_columns").is_none());
    }
}
