use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell. Numeric columns hold only `Number`/`Missing`,
/// categorical columns only `Text`/`Missing`.
///
/// Rows are hashed and compared during de-duplication, so `Value` must be
/// `Eq + Hash`; floats compare by total order with `-0.0 == 0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

fn canonical(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else {
        f
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Missing => 0,
                Number(_) => 1,
                Text(_) => 2,
            }
        }
        match (self, other) {
            (Missing, Missing) => std::cmp::Ordering::Equal,
            (Number(a), Number(b)) => canonical(*a).total_cmp(&canonical(*b)),
            (Text(a), Text(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Number(f) => canonical(*f).to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Missing => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => write!(f, "<missing>"),
        }
    }
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON rendering used in previews: numbers stay numbers, missing is `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Missing => serde_json::Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A named, typed value sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    values: Vec<Value>,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            values: values
                .into_iter()
                .map(|v| v.map(Value::Number).unwrap_or(Value::Missing))
                .collect(),
        }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            values: values
                .into_iter()
                .map(|v| v.map(|s| Value::Text(s.into())).unwrap_or(Value::Missing))
                .collect(),
        }
    }

    /// Build a column of the given kind from loosely typed cells.
    ///
    /// Text in a numeric column must parse as a number; numbers in a
    /// categorical column become their display text.
    pub fn coerce(name: impl Into<String>, kind: ColumnKind, cells: Vec<Value>) -> Result<Self> {
        let name = name.into();
        let values = match kind {
            ColumnKind::Numeric => cells
                .into_iter()
                .enumerate()
                .map(|(row, cell)| match cell {
                    Value::Text(s) => s.trim().parse::<f64>().map(Value::Number).map_err(|_| {
                        EngineError::unsupported(format!(
                            "column '{name}' row {row}: '{s}' is not a number"
                        ))
                    }),
                    other => Ok(other),
                })
                .collect::<Result<Vec<_>>>()?,
            ColumnKind::Categorical => cells
                .into_iter()
                .map(|cell| match cell {
                    Value::Number(v) => Value::Text(v.to_string()),
                    other => other,
                })
                .collect(),
        };
        Ok(Self { name, kind, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Non-missing numeric values in row order (empty for categorical columns).
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

    /// Approximate in-memory footprint: 8 bytes per cell plus text payloads.
    fn memory_usage(&self) -> usize {
        self.values
            .iter()
            .map(|v| match v {
                Value::Text(s) => 8 + s.len(),
                _ => 8,
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Dataset – ordered named columns sharing one row count
// ---------------------------------------------------------------------------

/// An immutable table. Operations return new datasets; cells are never
/// edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Assemble a dataset, checking name uniqueness and equal column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            if !seen.insert(col.name()) {
                return Err(EngineError::parse(format!(
                    "duplicate column name '{}'",
                    col.name()
                )));
            }
        }

        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(EngineError::parse(format!(
                "column '{}' has {} values, expected {n_rows}",
                bad.name(),
                bad.len()
            )));
        }

        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// `[rows, cols]`
    pub fn shape(&self) -> [usize; 2] {
        [self.n_rows, self.columns.len()]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// New dataset holding only `rows`, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            n_rows: rows.len(),
        }
    }

    /// New dataset without the named columns; unknown names are ignored.
    pub fn without_columns(&self, names: &BTreeSet<String>) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(c.name()))
                .cloned()
                .collect(),
            n_rows: self.n_rows,
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(Column::memory_usage).sum()
    }
}

// ---------------------------------------------------------------------------
// ColumnMap – name-keyed results in dataset order
// ---------------------------------------------------------------------------

/// Per-column results that keep insertion order (normally dataset column
/// order) and serialize as a JSON object in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for ColumnMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> ColumnMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key`, or overwrite its value in place if already present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V, K: AsRef<str> + ?Sized> std::ops::Index<&K> for ColumnMap<V> {
    type Output = V;

    fn index(&self, key: &K) -> &V {
        let key = key.as_ref();
        match self.get(key) {
            Some(v) => v,
            None => panic!("no entry for column '{key}'"),
        }
    }
}

impl<V, K: Into<String>> FromIterator<(K, V)> for ColumnMap<V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a, V> IntoIterator for &'a ColumnMap<V> {
    type Item = &'a (String, V);
    type IntoIter = std::slice::Iter<'a, (String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<V: Serialize> Serialize for ColumnMap<V> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}
