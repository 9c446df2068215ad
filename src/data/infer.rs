use std::collections::BTreeSet;

use super::model::{ColumnKind, Value};

// ---------------------------------------------------------------------------
// Column kind inference
// ---------------------------------------------------------------------------

/// Decides whether a freshly parsed column is numeric or categorical.
///
/// Loaders hand over raw cells (text from delimited files, numbers from typed
/// formats, `Missing` for blanks); the chosen kind is then enforced by
/// [`Column::coerce`](super::model::Column::coerce).
pub trait KindInference: Send + Sync {
    fn infer(&self, column: &str, cells: &[Value]) -> ColumnKind;
}

/// Numeric when every non-missing cell is a number or parses as one.
///
/// A column with no values at all is numeric, matching how an all-blank CSV
/// column loads as a float column of NaNs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericIfAllParse;

impl KindInference for NumericIfAllParse {
    fn infer(&self, _column: &str, cells: &[Value]) -> ColumnKind {
        let all_numeric = cells.iter().all(|cell| match cell {
            Value::Missing | Value::Number(_) => true,
            Value::Text(s) => s.trim().parse::<f64>().is_ok(),
        });
        if all_numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }
}

/// Pins the named columns to categorical (e.g. numeric-looking identifiers
/// such as zip codes) and defers to `inner` for everything else.
#[derive(Debug, Clone, Default)]
pub struct ForceCategorical<I = NumericIfAllParse> {
    pub columns: BTreeSet<String>,
    pub inner: I,
}

impl<I: KindInference> KindInference for ForceCategorical<I> {
    fn infer(&self, column: &str, cells: &[Value]) -> ColumnKind {
        if self.columns.contains(column) {
            ColumnKind::Categorical
        } else {
            self.inner.infer(column, cells)
        }
    }
}
