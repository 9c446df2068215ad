use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::model::{Dataset, Value};

// ---------------------------------------------------------------------------
// Cleaning options and history
// ---------------------------------------------------------------------------

/// Declarative cleaning request. Steps always run in the same order:
/// drop columns, then duplicates, then rows with missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanOptions {
    #[serde(default)]
    pub drop_nulls: bool,
    #[serde(default)]
    pub drop_duplicates: bool,
    /// Unknown names are ignored.
    #[serde(default)]
    pub columns_to_drop: BTreeSet<String>,
}

/// One applied cleaning step, kept in the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Transformation {
    DropColumns { columns: Vec<String> },
    DropDuplicates { removed: usize },
    DropNulls { removed: usize },
}

/// Result of a cleaning pass.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub dataset: Dataset,
    pub steps: Vec<Transformation>,
}

// ---------------------------------------------------------------------------
// Row selection
// ---------------------------------------------------------------------------

/// Indices of the first occurrence of every distinct row, in order.
pub fn first_occurrence_indices(dataset: &Dataset) -> Vec<usize> {
    let mut seen: HashSet<Vec<&Value>> = HashSet::with_capacity(dataset.n_rows());
    (0..dataset.n_rows())
        .filter(|&i| seen.insert(dataset.row(i)))
        .collect()
}

/// Indices of rows with no missing cell.
pub fn complete_row_indices(dataset: &Dataset) -> Vec<usize> {
    (0..dataset.n_rows())
        .filter(|&i| dataset.columns().iter().all(|c| !c.values()[i].is_missing()))
        .collect()
}

/// Apply `options` to `dataset`, producing a new dataset and the list of
/// steps that actually ran.
pub fn clean(dataset: &Dataset, options: &CleanOptions) -> Cleaned {
    let mut steps = Vec::new();
    let mut current = dataset.clone();

    if !options.columns_to_drop.is_empty() {
        let dropped: Vec<String> = current
            .column_names()
            .into_iter()
            .filter(|name| options.columns_to_drop.contains(name))
            .collect();
        if !dropped.is_empty() {
            current = current.without_columns(&options.columns_to_drop);
            steps.push(Transformation::DropColumns { columns: dropped });
        }
    }

    if options.drop_duplicates {
        let keep = first_occurrence_indices(&current);
        let removed = current.n_rows() - keep.len();
        current = current.take_rows(&keep);
        steps.push(Transformation::DropDuplicates { removed });
    }

    if options.drop_nulls {
        let keep = complete_row_indices(&current);
        let removed = current.n_rows() - keep.len();
        current = current.take_rows(&keep);
        steps.push(Transformation::DropNulls { removed });
    }

    Cleaned {
        dataset: current,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;
    use proptest::prelude::*;

    fn letters(rows: &[&str]) -> Dataset {
        Dataset::new(vec![Column::categorical(
            "letter",
            rows.iter().map(|s| Some(*s)).collect(),
        )])
        .unwrap()
    }

    #[test]
    fn test_drop_duplicates_keeps_first_in_order() {
        let ds = letters(&["A", "B", "A", "C"]);
        let out = clean(
            &ds,
            &CleanOptions {
                drop_duplicates: true,
                ..CleanOptions::default()
            },
        );
        let values: Vec<String> = out.dataset.columns()[0]
            .values()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(values, vec!["A", "B", "C"]);
        assert_eq!(out.steps, vec![Transformation::DropDuplicates { removed: 1 }]);
    }

    #[test]
    fn test_noop_clean_is_identity() {
        let ds = letters(&["A", "B", "A"]);
        let out = clean(&ds, &CleanOptions::default());
        assert_eq!(out.dataset, ds);
        assert!(out.steps.is_empty());
    }

    #[test]
    fn test_fixed_order_drop_columns_before_nulls() {
        // Dropping the only column with blanks first means drop_nulls removes nothing.
        let ds = Dataset::new(vec![
            Column::numeric("keep", vec![Some(1.0), Some(2.0), Some(3.0)]),
            Column::numeric("holes", vec![None, Some(1.0), None]),
        ])
        .unwrap();
        let out = clean(
            &ds,
            &CleanOptions {
                drop_nulls: true,
                drop_duplicates: false,
                columns_to_drop: BTreeSet::from(["holes".to_string(), "ghost".to_string()]),
            },
        );
        assert_eq!(out.dataset.shape(), [3, 1]);
        assert_eq!(
            out.steps,
            vec![
                Transformation::DropColumns {
                    columns: vec!["holes".into()]
                },
                Transformation::DropNulls { removed: 0 },
            ]
        );
    }

    #[test]
    fn test_duplicates_before_nulls() {
        let ds = Dataset::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(1.0), None, None]),
            Column::categorical("b", vec![Some("x"), Some("x"), Some("y"), Some("y")]),
        ])
        .unwrap();
        let out = clean(
            &ds,
            &CleanOptions {
                drop_nulls: true,
                drop_duplicates: true,
                columns_to_drop: BTreeSet::new(),
            },
        );
        assert_eq!(out.dataset.n_rows(), 1);
        assert_eq!(
            out.steps,
            vec![
                Transformation::DropDuplicates { removed: 2 },
                Transformation::DropNulls { removed: 1 },
            ]
        );
    }

    fn arb_dataset() -> impl Strategy<Value = Dataset> {
        (1usize..4, 0usize..12).prop_flat_map(|(n_cols, n_rows)| {
            prop::collection::vec(
                prop::collection::vec(prop::option::of(0i32..3), n_rows),
                n_cols,
            )
            .prop_map(|cols| {
                let columns = cols
                    .into_iter()
                    .enumerate()
                    .map(|(i, vals)| {
                        Column::numeric(
                            format!("c{i}"),
                            vals.into_iter().map(|v| v.map(f64::from)).collect(),
                        )
                    })
                    .collect();
                Dataset::new(columns).unwrap()
            })
        })
    }

    proptest! {
        #[test]
        fn prop_drop_nulls_removes_exactly_incomplete_rows(ds in arb_dataset()) {
            let out = clean(&ds, &CleanOptions { drop_nulls: true, ..CleanOptions::default() });
            let expected: Vec<Vec<&Value>> = (0..ds.n_rows())
                .map(|i| ds.row(i))
                .filter(|row| row.iter().all(|v| !v.is_missing()))
                .collect();
            let actual: Vec<Vec<&Value>> = (0..out.dataset.n_rows()).map(|i| out.dataset.row(i)).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_noop_clean_preserves_dataset(ds in arb_dataset()) {
            let out = clean(&ds, &CleanOptions::default());
            prop_assert_eq!(out.dataset, ds);
        }

        #[test]
        fn prop_dedup_leaves_distinct_rows(ds in arb_dataset()) {
            let out = clean(&ds, &CleanOptions { drop_duplicates: true, ..CleanOptions::default() });
            let rows: HashSet<Vec<&Value>> = (0..out.dataset.n_rows()).map(|i| out.dataset.row(i)).collect();
            prop_assert_eq!(rows.len(), out.dataset.n_rows());
        }
    }
}
