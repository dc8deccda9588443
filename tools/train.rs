//! Model Trainer
//!
//! Fits the feature scaler, a ridge regressor and a random forest on a CSV of
//! rubric metrics and writes the artifacts the prediction service loads at
//! startup.
//!
//! Usage: `train <csv> [artifacts_dir] [target_column]`

use anyhow::{bail, Context, Result};
use aprender::linear_model::Ridge;
use aprender::metrics::{mse, r_squared, rmse};
use aprender::model_selection::train_test_split;
use aprender::preprocessing::StandardScaler as ScalerFit;
use aprender::primitives::{Matrix, Vector};
use aprender::traits::{Estimator, Transformer};
use aprender::tree::{RandomForestRegressor, RegressionTreeNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thesis_score_service::models::regressor::{
    LinearModel, NativeModel, RegressionTree, TreeEnsemble, TreeNode,
};
use thesis_score_service::models::StandardScaler;
use thesis_score_service::normalizer::clean_value;
use thesis_score_service::schema::{FeatureSchema, PERCENT_MARKER};
use thesis_score_service::types::MetricsRecord;
use thesis_score_service::RawValue;
use tracing::{info, warn};

/// Columns that identify a thesis rather than describe it
const IDENTIFIER_COLUMNS: [&str; 3] = ["N°", "Universidad", "Tesis"];
const DEFAULT_TARGET: &str = "TOTAL";
const SPLIT_SEED: u64 = 42;
const TEST_FRACTION: f32 = 0.2;
const RIDGE_ALPHA: f32 = 1e-3;
const RIDGE_NAME: &str = "Ridge";
const FOREST_NAME: &str = "RandomForest";
const FOREST_TREES: usize = 500;
const FOREST_MAX_DEPTH: usize = 15;
/// Scales at or below this are left unscaled, as aprender's transform does
const MIN_SCALE: f32 = 1e-10;

/// Cleaned training data in row-major order
#[derive(Debug)]
struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

/// The fields of a fitted forest needed to export its trees
#[derive(Deserialize)]
struct ForestDump {
    trees: Vec<TreeDump>,
}

#[derive(Deserialize)]
struct TreeDump {
    tree: Option<RegressionTreeNode>,
}

/// Test-split residuals of the default model
#[derive(Debug, Serialize)]
struct TestError {
    y_test: f64,
    y_pred_test: f64,
    abs_error: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("train=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(csv_path) = args.get(1) else {
        bail!("usage: train <csv> [artifacts_dir] [target_column]");
    };
    let artifacts_dir = args.get(2).map(|s| s.as_str()).unwrap_or("artifacts");
    let target = args.get(3).map(|s| s.as_str()).unwrap_or(DEFAULT_TARGET);

    info!("Training on {} (target: {})", csv_path, target);
    let report = train(Path::new(csv_path), Path::new(artifacts_dir), target)?;

    for (name, metrics) in &report {
        info!(
            n_train = metrics.n_train,
            n_test = metrics.n_test,
            rmse_train = format!("{:.4}", metrics.rmse_train),
            rmse_test = format!("{:.4}", metrics.rmse_test),
            r2_train = format!("{:.4}", metrics.r2_train),
            r2_test = format!("{:.4}", metrics.r2_test),
            "{} metrics",
            name
        );
    }
    info!("Artifacts written to {}", artifacts_dir);

    Ok(())
}

fn train(
    csv_path: &Path,
    artifacts_dir: &Path,
    target: &str,
) -> Result<BTreeMap<String, MetricsRecord>> {
    let columns_path = artifacts_dir.join("model_columns.json");
    let columns = if columns_path.is_file() {
        let schema = FeatureSchema::from_file(&columns_path)?;
        info!("Using {} feature columns from {}", schema.len(), columns_path.display());
        Some(schema.to_vec())
    } else {
        None
    };

    let dataset = read_dataset(csv_path, target, columns)?;
    let n_total = dataset.targets.len();
    if n_total < 2 {
        bail!("need at least 2 rows with a numeric target, found {}", n_total);
    }
    info!(
        rows = n_total,
        features = dataset.columns.len(),
        "Dataset loaded"
    );

    let scaler = fit_scaler(&dataset.rows)?;
    let scaled: Vec<Vec<f64>> = dataset
        .rows
        .iter()
        .map(|row| scaler.transform_slice(row))
        .collect();

    let x = to_matrix(&scaled)?;
    let y = to_vector(&dataset.targets);
    let (x_train, x_test, y_train, y_test) =
        train_test_split(&x, &y, TEST_FRACTION, Some(SPLIT_SEED)).map_err(anyhow::Error::msg)?;
    info!(
        train = y_train.len(),
        test = y_test.len(),
        seed = SPLIT_SEED,
        "Split dataset"
    );

    let mut ridge = Ridge::new(RIDGE_ALPHA);
    ridge.fit(&x_train, &y_train).context("Ridge fit failed")?;
    let ridge_metrics = evaluate(
        &ridge.predict(&x_train),
        &y_train,
        &ridge.predict(&x_test),
        &y_test,
        n_total,
    );
    let ridge_model = NativeModel::Linear(LinearModel {
        intercept: f64::from(ridge.intercept()),
        coefficients: ridge.coefficients().as_slice().iter().map(|&c| f64::from(c)).collect(),
    });

    let mut forest = RandomForestRegressor::new(FOREST_TREES)
        .with_max_depth(FOREST_MAX_DEPTH)
        .with_random_state(SPLIT_SEED);
    forest.fit(&x_train, &y_train).context("RandomForest fit failed")?;
    let forest_test_pred = forest.predict(&x_test);
    let forest_metrics = evaluate(
        &forest.predict(&x_train),
        &y_train,
        &forest_test_pred,
        &y_test,
        n_total,
    );
    let forest_model = NativeModel::TreeEnsemble(export_forest(&forest)?);

    let models_dir = artifacts_dir.join("models");
    fs::create_dir_all(&models_dir)
        .with_context(|| format!("Failed to create {}", models_dir.display()))?;
    write_json(&columns_path, &dataset.columns)?;
    write_json(&artifacts_dir.join("scaler.json"), &scaler)?;
    write_json(&models_dir.join(format!("{}.json", RIDGE_NAME)), &ridge_model)?;
    write_json(&models_dir.join(format!("{}.json", FOREST_NAME)), &forest_model)?;
    write_test_errors(
        &artifacts_dir.join("errors_test.csv"),
        &y_test,
        &forest_test_pred,
    )?;

    let mut report = BTreeMap::new();
    report.insert(RIDGE_NAME.to_string(), ridge_metrics);
    report.insert(FOREST_NAME.to_string(), forest_metrics);
    write_json(&artifacts_dir.join("metrics.json"), &report)?;

    Ok(report)
}

fn read_dataset(path: &Path, target: &str, columns: Option<Vec<String>>) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let target_idx = headers
        .iter()
        .position(|h| h == target)
        .with_context(|| format!("target column '{}' not found in {}", target, path.display()))?;

    let columns = columns.unwrap_or_else(|| {
        headers
            .iter()
            .filter(|h| !h.is_empty() && *h != target && !IDENTIFIER_COLUMNS.contains(&h.as_str()))
            .cloned()
            .collect()
    });
    if columns.is_empty() {
        bail!("no feature columns in {}", path.display());
    }

    let indices = columns
        .iter()
        .map(|c| {
            headers
                .iter()
                .position(|h| h == c)
                .with_context(|| format!("feature column '{}' not found in {}", c, path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    let mut dropped = 0usize;
    let mut stray_percent: BTreeMap<&str, usize> = BTreeMap::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {}", line + 1))?;
        let Some(y) = record.get(target_idx).and_then(extract_target) else {
            dropped += 1;
            continue;
        };

        let row = columns
            .iter()
            .zip(&indices)
            .map(|(column, &idx)| {
                let cell = record.get(idx).unwrap_or_default();
                if cell.contains(PERCENT_MARKER) && !FeatureSchema::is_percentage(column) {
                    *stray_percent.entry(column.as_str()).or_default() += 1;
                }
                clean_value(column, &RawValue::from(cell))
            })
            .collect();
        rows.push(row);
        targets.push(y);
    }
    if dropped > 0 {
        warn!(dropped, "Rows without a numeric target were dropped");
    }
    for (column, cells) in stray_percent {
        warn!(
            column,
            cells, "Column is not named as a percentage; cells with '%' were cleaned to 0.0"
        );
    }

    Ok(Dataset {
        columns,
        rows,
        targets,
    })
}

/// First number in a free-text score cell, e.g. `"Total: 14,5 pts"` -> 14.5
fn extract_target(cell: &str) -> Option<f64> {
    let text = cell.replace(',', ".");
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];

    let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut end = digits(rest);
    if rest[end..].starts_with('.') {
        let fraction = digits(&rest[end + 1..]);
        if fraction > 0 {
            end += 1 + fraction;
        }
    }
    rest[..end].parse().ok()
}

/// Fit aprender's scaler and freeze it in the serving format
fn fit_scaler(rows: &[Vec<f64>]) -> Result<StandardScaler> {
    let mut fitted = ScalerFit::new();
    fitted.fit(&to_matrix(rows)?).context("StandardScaler fit failed")?;

    let mean = fitted.mean().iter().map(|&m| f64::from(m)).collect();
    let scale = fitted
        .std()
        .iter()
        .map(|&s| if s > MIN_SCALE { f64::from(s) } else { 1.0 })
        .collect();
    Ok(StandardScaler::new(mean, scale)?)
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<Matrix<f32>> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let data = rows.iter().flatten().map(|&v| v as f32).collect();
    Matrix::from_vec(rows.len(), width, data).map_err(anyhow::Error::msg)
}

fn to_vector(values: &[f64]) -> Vector<f32> {
    Vector::from_vec(values.iter().map(|&v| v as f32).collect())
}

fn evaluate(
    train_pred: &Vector<f32>,
    y_train: &Vector<f32>,
    test_pred: &Vector<f32>,
    y_test: &Vector<f32>,
    n_total: usize,
) -> MetricsRecord {
    MetricsRecord {
        mse_train: Some(f64::from(mse(train_pred, y_train))),
        mse_test: Some(f64::from(mse(test_pred, y_test))),
        rmse_train: f64::from(rmse(train_pred, y_train)),
        rmse_test: f64::from(rmse(test_pred, y_test)),
        r2_train: f64::from(r_squared(train_pred, y_train)),
        r2_test: f64::from(r_squared(test_pred, y_test)),
        n_total,
        n_train: y_train.len(),
        n_test: y_test.len(),
    }
}

/// Convert a fitted forest into the flat tree ensemble the service reads
fn export_forest(forest: &RandomForestRegressor) -> Result<TreeEnsemble> {
    let dump: ForestDump = serde_json::from_value(serde_json::to_value(forest)?)
        .context("Failed to read fitted forest")?;

    let trees = dump
        .trees
        .iter()
        .enumerate()
        .map(|(i, tree)| {
            let root = tree
                .tree
                .as_ref()
                .with_context(|| format!("tree {} is not fitted", i))?;
            let mut nodes = Vec::new();
            flatten_tree(root, &mut nodes);
            Ok(RegressionTree { nodes })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TreeEnsemble { trees })
}

/// Append `node` and its subtrees in pre-order, returning its index
fn flatten_tree(node: &RegressionTreeNode, nodes: &mut Vec<TreeNode>) -> usize {
    let index = nodes.len();
    match node {
        RegressionTreeNode::Leaf(leaf) => nodes.push(TreeNode::Leaf {
            value: f64::from(leaf.value),
        }),
        RegressionTreeNode::Node(split) => {
            nodes.push(TreeNode::Leaf { value: 0.0 });
            let left = flatten_tree(&split.left, nodes);
            let right = flatten_tree(&split.right, nodes);
            nodes[index] = TreeNode::Split {
                feature: split.feature_idx,
                threshold: f64::from(split.threshold),
                left,
                right,
            };
        }
    }
    index
}

fn write_test_errors(path: &Path, y_test: &Vector<f32>, y_pred: &Vector<f32>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for (&y, &pred) in y_test.as_slice().iter().zip(y_pred.as_slice()) {
        let (y, pred) = (f64::from(y), f64::from(pred));
        writer.serialize(TestError {
            y_test: y,
            y_pred_test: pred,
            abs_error: (y - pred).abs(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
