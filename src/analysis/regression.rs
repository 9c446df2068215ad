//! Baseline linear regression.
//!
//! Fitting and scoring are delegated to `smartcore`; this module validates
//! the request, assembles the design matrix and makes the seeded split.

use std::collections::HashSet;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2};

use crate::data::model::{ColumnKind, ColumnMap, Dataset};
use crate::error::{EngineError, Result};

/// Tolerance when turning `test_size * n` into a whole row count, so that
/// 0.3 * 100 is 30 and not 31.
const SPLIT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub test_size: f64,
    pub target_column: String,
    pub feature_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleCounts {
    pub train: usize,
    pub test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    pub model_type: &'static str,
    pub target_column: String,
    pub feature_columns: Vec<String>,
    /// `None` when the test targets have no variance.
    pub r2_score: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    pub intercept: f64,
    pub samples: SampleCounts,
    /// Fitted coefficient per feature, in request order.
    pub feature_importance: ColumnMap<f64>,
}

/// Training rows after dropping incomplete ones.
struct Design {
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

fn validate(dataset: &Dataset, request: &ModelRequest) -> Result<()> {
    let t = request.test_size;
    if !(t > 0.0 && t < 1.0) {
        return Err(EngineError::InvalidTestFraction(t));
    }
    if request.feature_columns.is_empty() {
        return Err(EngineError::invalid_column(
            "at least one feature column must be selected",
        ));
    }

    let require_numeric = |name: &str| match dataset.column(name) {
        None => Err(EngineError::invalid_column(format!(
            "column not found in dataset: {name}"
        ))),
        Some(col) if col.kind() != ColumnKind::Numeric => Err(EngineError::invalid_column(
            format!("column '{name}' is not numeric"),
        )),
        Some(_) => Ok(()),
    };

    require_numeric(request.target_column.as_str())?;
    let mut seen = HashSet::new();
    for feature in &request.feature_columns {
        require_numeric(feature.as_str())?;
        if !seen.insert(feature.as_str()) {
            return Err(EngineError::invalid_column(format!(
                "feature '{feature}' listed more than once"
            )));
        }
    }
    if seen.contains(request.target_column.as_str()) {
        return Err(EngineError::TargetInFeatures(request.target_column.clone()));
    }
    Ok(())
}

fn design(dataset: &Dataset, request: &ModelRequest) -> Result<Design> {
    let lookup = |name: &str| {
        dataset
            .column(name)
            .ok_or_else(|| EngineError::invalid_column(name.to_string()))
    };
    let target = lookup(request.target_column.as_str())?;
    let features = request
        .feature_columns
        .iter()
        .map(|f| lookup(f.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for i in 0..dataset.n_rows() {
        let Some(y) = target.values()[i].as_f64() else { continue };
        let row: Option<Vec<f64>> = features.iter().map(|c| c.values()[i].as_f64()).collect();
        if let Some(row) = row {
            rows.push(row);
            targets.push(y);
        }
    }
    Ok(Design { rows, targets })
}

/// Row counts for a `test_size` split of `n` rows: the test side gets
/// `ceil(test_size * n)` rows.
pub fn split_sizes(n: usize, test_size: f64) -> (usize, usize) {
    let n_test = ((test_size * n as f64) - SPLIT_EPSILON).ceil().max(0.0) as usize;
    let n_test = n_test.min(n);
    (n - n_test, n_test)
}

/// Seeded permutation split: the first `n_test` shuffled indices form the
/// test set, the rest the training set.
pub fn split_indices(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let (_, n_test) = split_sizes(n, test_size);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    (train, indices)
}

fn matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
        .map_err(|e| EngineError::ModelFit(format!("building feature matrix: {e:?}")))
}

fn pick<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

/// Validate, split, fit on the training rows and score on the test rows.
pub fn train(dataset: &Dataset, request: &ModelRequest, seed: u64) -> Result<ModelResult> {
    validate(dataset, request)?;
    let design = design(dataset, request)?;

    let n = design.targets.len();
    if n < 2 {
        return Err(EngineError::insufficient(format!(
            "{n} complete rows remain after dropping missing values, need at least 2"
        )));
    }
    let (train_idx, test_idx) = split_indices(n, request.test_size, seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(EngineError::insufficient(format!(
            "a test size of {} leaves an empty partition of {n} rows",
            request.test_size
        )));
    }
    // The solver fits an intercept too, so it needs more rows than features.
    if train_idx.len() <= request.feature_columns.len() {
        return Err(EngineError::insufficient(format!(
            "{} training rows cannot fit {} features plus an intercept",
            train_idx.len(),
            request.feature_columns.len()
        )));
    }
    debug!(
        "Fitting linear regression on {} rows, scoring on {}",
        train_idx.len(),
        test_idx.len()
    );

    let x_train = matrix(&pick(&design.rows, &train_idx))?;
    let y_train = pick(&design.targets, &train_idx);
    let x_test = matrix(&pick(&design.rows, &test_idx))?;
    let y_test = pick(&design.targets, &test_idx);

    let model = LinearRegression::fit(&x_train, &y_train, LinearRegressionParameters::default())
        .map_err(|e| EngineError::ModelFit(format!("{e:?}")))?;
    let y_pred: Vec<f64> = model
        .predict(&x_test)
        .map_err(|e| EngineError::ModelFit(format!("{e:?}")))?;

    let r2_score = Some(r2(&y_test, &y_pred)).filter(|v| v.is_finite());
    let rmse = mean_squared_error(&y_test, &y_pred).sqrt();
    let mae = mean_absolute_error(&y_test, &y_pred);

    let coefficients: Vec<f64> = model.coefficients().iterator(0).copied().collect();
    let feature_importance: ColumnMap<f64> = request
        .feature_columns
        .iter()
        .cloned()
        .zip(coefficients)
        .collect();

    Ok(ModelResult {
        model_type: "linear_regression",
        target_column: request.target_column.clone(),
        feature_columns: request.feature_columns.clone(),
        r2_score,
        rmse,
        mae,
        intercept: *model.intercept(),
        samples: SampleCounts {
            train: train_idx.len(),
            test: test_idx.len(),
        },
        feature_importance,
    })
}
