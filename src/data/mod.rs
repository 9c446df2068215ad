/// Data layer: core types, loading, kind inference and cleaning.
///
/// Architecture:
/// ```text
///  .csv / .tsv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐     ┌─────────┐
///   │  loader   │ ──▶ │  infer   │  raw cells → numeric | categorical
///   └──────────┘     └─────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Dataset  │  ordered named columns, one row count
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  clean    │  drop columns → drop duplicates → drop nulls
///   └──────────┘
/// ```

pub mod clean;
pub mod infer;
pub mod loader;
pub mod model;
