//! Statistical profile of a dataset.
//!
//! Summary statistics go through `statrs`; standard deviation is the sample
//! estimate (n - 1 denominator).

use serde::Serialize;
use statrs::statistics::Statistics;

use super::chart::category_counts;
use crate::data::model::{Column, ColumnKind, ColumnMap, Dataset};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub rows: usize,
    pub columns: usize,
    pub dtypes: DtypeSummary,
    pub missing: MissingReport,
    pub numeric_summary: ColumnMap<NumericSummary>,
    /// Value counts per categorical column, most frequent first.
    pub categorical_summary: ColumnMap<ColumnMap<usize>>,
    /// Pearson correlation over numeric columns; `None` where undefined.
    pub correlation: ColumnMap<ColumnMap<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DtypeSummary {
    pub numeric: usize,
    pub categorical: usize,
    pub details: ColumnMap<ColumnKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingReport {
    pub total: usize,
    pub by_column: ColumnMap<usize>,
    pub percentage: ColumnMap<f64>,
}

/// Stats over the non-missing values of one numeric column. All `None` when
/// the column has no values; `std` also needs at least two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

pub fn numeric_summary(values: &[f64]) -> NumericSummary {
    if values.is_empty() {
        return NumericSummary {
            mean: None,
            std: None,
            min: None,
            max: None,
        };
    }
    let std = if values.len() >= 2 {
        finite(Statistics::std_dev(values.iter()))
    } else {
        None
    };
    NumericSummary {
        mean: finite(Statistics::mean(values.iter())),
        std,
        min: Some(Statistics::min(values.iter())),
        max: Some(Statistics::max(values.iter())),
    }
}

fn value_counts(column: &Column) -> ColumnMap<usize> {
    let (values, counts) = category_counts(column);
    values.into_iter().zip(counts).collect()
}

/// Pearson correlation over rows where both columns are present.
pub fn pearson(a: &Column, b: &Column) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .values()
        .iter()
        .zip(b.values())
        .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
        .unzip();
    if xs.len() < 2 {
        return None;
    }

    let sx = Statistics::std_dev(xs.iter());
    let sy = Statistics::std_dev(ys.iter());
    if sx == 0.0 || sy == 0.0 {
        return None;
    }
    let cov = Statistics::covariance(xs.iter(), ys.iter());
    finite(cov / (sx * sy)).map(|r| r.clamp(-1.0, 1.0))
}

fn correlation_matrix(numeric: &[&Column]) -> ColumnMap<ColumnMap<Option<f64>>> {
    let n = numeric.len();
    if n < 2 {
        return ColumnMap::new();
    }

    // Upper triangle once, mirrored, so both halves hold the same value.
    let mut cells = vec![vec![Some(1.0); n]; n];
    for i in 0..n {
        for j in i + 1..n {
            let r = pearson(numeric[i], numeric[j]);
            cells[i][j] = r;
            cells[j][i] = r;
        }
    }

    numeric
        .iter()
        .zip(cells)
        .map(|(a, row)| {
            let row: ColumnMap<Option<f64>> =
                numeric.iter().map(|b| b.name()).zip(row).collect();
            (a.name(), row)
        })
        .collect()
}

/// Build the full profile. `percentage_decimals` controls rounding of the
/// missing-value percentages.
pub fn profile(dataset: &Dataset, percentage_decimals: u32) -> Profile {
    let rows = dataset.n_rows();

    let mut details = ColumnMap::new();
    let mut by_column = ColumnMap::new();
    let mut percentage = ColumnMap::new();
    let mut numeric_summary_map = ColumnMap::new();
    let mut categorical_summary = ColumnMap::new();
    let mut numeric_cols = Vec::new();

    for col in dataset.columns() {
        let name = col.name().to_string();
        let missing = col.missing_count();
        let pct = if rows == 0 {
            0.0
        } else {
            round_to(missing as f64 / rows as f64 * 100.0, percentage_decimals)
        };

        details.insert(name.clone(), col.kind());
        by_column.insert(name.clone(), missing);
        percentage.insert(name.clone(), pct);

        match col.kind() {
            ColumnKind::Numeric => {
                numeric_summary_map.insert(name, numeric_summary(&col.numbers()));
                numeric_cols.push(col);
            }
            ColumnKind::Categorical => {
                categorical_summary.insert(name, value_counts(col));
            }
        }
    }

    let numeric = numeric_cols.len();
    Profile {
        rows,
        columns: dataset.n_cols(),
        dtypes: DtypeSummary {
            numeric,
            categorical: dataset.n_cols() - numeric,
            details,
        },
        missing: MissingReport {
            total: by_column.values().sum(),
            by_column,
            percentage,
        },
        numeric_summary: numeric_summary_map,
        categorical_summary,
        correlation: correlation_matrix(&numeric_cols),
    }
}
