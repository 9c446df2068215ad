use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::model::{Column, ColumnKind, Dataset, Value};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Chart request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Histogram,
    Bar,
    Scatter,
}

/// What the caller wants plotted. `y` is required for scatter charts only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub x: String,
    #[serde(default)]
    pub y: Option<String>,
}

// ---------------------------------------------------------------------------
// Chart payload – series data, no rendering
// ---------------------------------------------------------------------------

/// Half-open bin `[start, end)`; the last bin also includes `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    /// Count per distinct value, most frequent first.
    Categories {
        x: String,
        categories: Vec<String>,
        counts: Vec<usize>,
        missing: usize,
    },
    /// Count per equal-width numeric bin.
    Bins {
        x: String,
        bins: Vec<Bin>,
        counts: Vec<usize>,
        missing: usize,
    },
    /// Paired coordinates; rows with either value missing are dropped.
    Points {
        x: String,
        y: String,
        points: Vec<(serde_json::Value, serde_json::Value)>,
        dropped: usize,
    },
}

// ---------------------------------------------------------------------------
// Series builders
// ---------------------------------------------------------------------------

/// Distinct-value counts ordered by count (desc), then value (asc).
pub fn category_counts(column: &Column) -> (Vec<String>, Vec<usize>) {
    let mut counts: HashMap<&Value, usize> = HashMap::new();
    for value in column.values().iter().filter(|v| !v.is_missing()) {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut entries: Vec<(&Value, usize)> = counts.into_iter().collect();
    entries.sort_by(|(va, ca), (vb, cb)| cb.cmp(ca).then_with(|| va.cmp(vb)));
    entries
        .into_iter()
        .map(|(v, c)| (v.to_string(), c))
        .unzip()
}

/// Equal-width histogram over `[min, max]`. A constant column yields one
/// degenerate bin holding every value.
pub fn histogram(values: &[f64], n_bins: usize) -> (Vec<Bin>, Vec<usize>) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || n_bins == 0 {
        return (Vec::new(), Vec::new());
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return (vec![Bin { start: min, end: max }], vec![finite.len()]);
    }

    // Scaled before subtracting so that `max - min` cannot overflow.
    let width = max / n_bins as f64 - min / n_bins as f64;
    let bins = (0..n_bins)
        .map(|i| Bin {
            start: min + width * i as f64,
            end: if i + 1 == n_bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
        })
        .collect();

    let mut counts = vec![0usize; n_bins];
    for v in finite {
        let idx = ((v / width - min / width).floor() as usize).min(n_bins - 1);
        counts[idx] += 1;
    }
    (bins, counts)
}

fn lookup<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a Column> {
    dataset
        .column(name)
        .ok_or_else(|| EngineError::UnknownColumn(name.to_string()))
}

/// Build the series payload for `spec`.
pub fn visualize(dataset: &Dataset, spec: &ChartSpec, histogram_bins: usize) -> Result<ChartData> {
    if spec.kind == ChartKind::Scatter && spec.y.is_none() {
        return Err(EngineError::MissingYColumn);
    }
    let x = lookup(dataset, &spec.x)?;
    let y = spec.y.as_deref().map(|name| lookup(dataset, name)).transpose()?;

    match (spec.kind, y) {
        (ChartKind::Scatter, Some(y)) => {
            let mut dropped = 0;
            let points = x
                .values()
                .iter()
                .zip(y.values())
                .filter_map(|(xv, yv)| {
                    if xv.is_missing() || yv.is_missing() {
                        dropped += 1;
                        None
                    } else {
                        Some((xv.to_json(), yv.to_json()))
                    }
                })
                .collect();
            Ok(ChartData::Points {
                x: x.name().to_string(),
                y: y.name().to_string(),
                points,
                dropped,
            })
        }
        (ChartKind::Histogram, _) if x.kind() == ColumnKind::Numeric => {
            let (bins, counts) = histogram(&x.numbers(), histogram_bins);
            Ok(ChartData::Bins {
                x: x.name().to_string(),
                bins,
                counts,
                missing: x.missing_count(),
            })
        }
        _ => {
            let (categories, counts) = category_counts(x);
            Ok(ChartData::Categories {
                x: x.name().to_string(),
                categories,
                counts,
                missing: x.missing_count(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(vec![
            Column::numeric("num", vec![Some(0.0), Some(1.0), Some(2.5), None, Some(10.0)]),
            Column::categorical("cat", vec![Some("b"), Some("a"), Some("b"), None, Some("c")]),
            Column::numeric("other", vec![Some(5.0), None, Some(6.0), Some(7.0), Some(8.0)]),
        ])
        .unwrap()
    }

    fn spec(kind: ChartKind, x: &str, y: Option<&str>) -> ChartSpec {
        ChartSpec {
            kind,
            x: x.to_string(),
            y: y.map(str::to_string),
        }
    }

    #[test]
    fn test_scatter_without_y_fails() {
        let err = visualize(&sample(), &spec(ChartKind::Scatter, "num", None), 10).unwrap_err();
        assert!(matches!(err, EngineError::MissingYColumn));
    }

    #[test]
    fn test_unknown_columns_fail() {
        let err = visualize(&sample(), &spec(ChartKind::Bar, "nope", None), 10).unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn(ref c) if c == "nope"));
        let err =
            visualize(&sample(), &spec(ChartKind::Scatter, "num", Some("ghost")), 10).unwrap_err();
        assert_eq!(err.kind(), "unknown_column");
    }

    #[test]
    fn test_numeric_histogram_bins() {
        let data = visualize(&sample(), &spec(ChartKind::Histogram, "num", None), 10).unwrap();
        let ChartData::Bins { bins, counts, missing, .. } = data else {
            panic!("expected bins");
        };
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].start, 0.0);
        assert_eq!(bins[9].end, 10.0);
        assert_eq!(counts.iter().sum::<usize>(), 4);
        // width 1.0: 1.0 opens bin 1, 10.0 closes the last bin
        assert_eq!(counts[0], 1);
        assert_eq!(counts[1], 1);
        assert_eq!(counts[2], 1);
        assert_eq!(counts[9], 1);
        assert_eq!(missing, 1);
    }

    #[test]
    fn test_histogram_constant_values() {
        let (bins, counts) = histogram(&[3.0, 3.0, 3.0], 10);
        assert_eq!(bins, vec![Bin { start: 3.0, end: 3.0 }]);
        assert_eq!(counts, vec![3]);
    }

    #[test]
    fn test_histogram_tiny_range_still_bins() {
        let (bins, counts) = histogram(&[0.0, 1e-17, 2e-17], 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(counts.iter().sum::<usize>(), 3);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[9], 1);
    }

    #[test]
    fn test_histogram_extreme_range_has_finite_edges() {
        let (bins, counts) = histogram(&[-1e308, 0.0, 1e308], 10);
        assert_eq!(bins.len(), 10);
        assert!(bins.iter().all(|b| b.start.is_finite() && b.end.is_finite()));
        assert!(bins.windows(2).all(|w| w[0].start < w[1].start));
        assert_eq!(bins[0].start, -1e308);
        assert_eq!(bins[9].end, 1e308);
        assert_eq!(counts.iter().sum::<usize>(), 3);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[9], 1);
    }

    #[test]
    fn test_categorical_counts_ordered() {
        let data = visualize(&sample(), &spec(ChartKind::Bar, "cat", None), 10).unwrap();
        let ChartData::Categories { categories, counts, missing, .. } = data else {
            panic!("expected categories");
        };
        assert_eq!(categories, vec!["b", "a", "c"]);
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(missing, 1);
    }

    #[test]
    fn test_histogram_on_categorical_counts_categories() {
        let data = visualize(&sample(), &spec(ChartKind::Histogram, "cat", None), 10).unwrap();
        assert!(matches!(data, ChartData::Categories { .. }));
    }

    #[test]
    fn test_scatter_drops_incomplete_pairs() {
        let data =
            visualize(&sample(), &spec(ChartKind::Scatter, "num", Some("other")), 10).unwrap();
        let ChartData::Points { points, dropped, .. } = data else {
            panic!("expected points");
        };
        assert_eq!(dropped, 2);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], (serde_json::json!(0.0), serde_json::json!(5.0)));
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let data = visualize(&sample(), &spec(ChartKind::Bar, "cat", None), 10).unwrap();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "categories");
        assert_eq!(json["x"], "cat");
    }
}
