use std::path::Path;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::analysis::chart::{self, ChartData, ChartSpec};
use crate::analysis::profile::{self, Profile};
use crate::analysis::regression::{self, ModelRequest, ModelResult};
use crate::config::EngineConfig;
use crate::data::clean::{self, CleanOptions, Transformation};
use crate::data::infer::{KindInference, NumericIfAllParse};
use crate::data::loader::{self, CancelToken, Format, IngestOptions};
use crate::data::model::{ColumnKind, ColumnMap, Dataset};
use crate::error::Result;
use crate::state::Store;

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Shape, dtypes, missing counts and a preview of the active dataset, as
/// returned by upload, clean and reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: usize,
    /// Column names in dataset order.
    pub column_names: Vec<String>,
    pub shape: [usize; 2],
    pub memory_usage_bytes: usize,
    pub missing: ColumnMap<usize>,
    pub dtypes: ColumnMap<ColumnKind>,
    /// First rows as column → value maps, keys in dataset order.
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
    pub transformations: Vec<Transformation>,
}

impl DatasetSummary {
    pub fn build(dataset: &Dataset, history: &[Transformation], preview_rows: usize) -> Self {
        let names = dataset.column_names();
        let preview = (0..dataset.n_rows().min(preview_rows))
            .map(|i| {
                names
                    .iter()
                    .cloned()
                    .zip(dataset.row(i).into_iter().map(|v| v.to_json()))
                    .collect()
            })
            .collect();

        Self {
            rows: dataset.n_rows(),
            columns: dataset.n_cols(),
            shape: dataset.shape(),
            memory_usage_bytes: dataset.memory_usage(),
            missing: dataset
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.missing_count()))
                .collect(),
            dtypes: dataset
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.kind()))
                .collect(),
            column_names: names,
            preview,
            transformations: history.to_vec(),
        }
    }
}

/// Cheap shape query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataInfo {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One session: a store plus the settings every operation reads.
///
/// All methods take `&self`; the store serializes writers and lets readers
/// run side by side, so an `Engine` can be shared across request threads.
pub struct Engine {
    store: Store,
    config: EngineConfig,
    inference: Box<dyn KindInference>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_inference(config, Box::new(NumericIfAllParse))
    }

    /// Use a custom column-kind strategy for uploads.
    pub fn with_inference(config: EngineConfig, inference: Box<dyn KindInference>) -> Self {
        Self {
            store: Store::new(),
            config,
            inference,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn summary(&self, dataset: &Dataset, history: &[Transformation]) -> DatasetSummary {
        DatasetSummary::build(dataset, history, self.config.report.preview_rows)
    }

    fn ingest_options<'a>(&'a self, cancel: Option<&'a CancelToken>) -> IngestOptions<'a> {
        IngestOptions {
            config: &self.config.ingest,
            inference: self.inference.as_ref(),
            cancel,
        }
    }

    fn commit_upload(&self, source: &str, started: Instant, loaded: Result<Dataset>) -> Result<DatasetSummary> {
        let dataset = loaded.inspect_err(|e| warn!("Upload of {source} failed: {e}"))?;
        let dataset = self.store.set_raw(dataset);
        info!(
            "Loaded {source}: {} rows x {} columns in {:?}",
            dataset.n_rows(),
            dataset.n_cols(),
            started.elapsed()
        );
        Ok(self.summary(&dataset, &[]))
    }

    /// Parse a file and make it the session's raw dataset. On any failure
    /// the previously committed datasets stay in place.
    pub fn upload_file(
        &self,
        path: &Path,
        format: Option<Format>,
        cancel: Option<&CancelToken>,
    ) -> Result<DatasetSummary> {
        let started = Instant::now();
        let loaded = loader::load_file(path, format, &self.ingest_options(cancel));
        self.commit_upload(&path.display().to_string(), started, loaded)
    }

    /// Same as [`Engine::upload_file`] for an in-memory upload.
    pub fn upload_bytes(
        &self,
        bytes: &[u8],
        name: Option<&str>,
        format: Option<Format>,
        cancel: Option<&CancelToken>,
    ) -> Result<DatasetSummary> {
        let started = Instant::now();
        let loaded = loader::load_bytes(bytes, name, format, &self.ingest_options(cancel));
        self.commit_upload(name.unwrap_or("upload"), started, loaded)
    }

    /// Clean the active dataset and commit the result as the cleaned dataset.
    pub fn clean(&self, options: &CleanOptions) -> Result<DatasetSummary> {
        info!("Cleaning data with options: {options:?}");
        let snapshot = self.store.derive(|active| {
            let before = active.shape();
            let out = clean::clean(active, options);
            info!("Cleaned {before:?} -> {:?}", out.dataset.shape());
            Ok((out.dataset, out.steps))
        })?;
        Ok(self.summary(&snapshot.dataset, &snapshot.history))
    }

    /// Discard cleaning so the raw dataset is active again.
    pub fn reset(&self) -> Result<DatasetSummary> {
        let raw = self.store.reset_to_raw()?;
        info!("Reset active data to the raw upload");
        Ok(self.summary(&raw, &[]))
    }

    /// Forget everything loaded in this session.
    pub fn clear(&self) {
        self.store.clear();
        info!("Session cleared");
    }

    pub fn info(&self) -> Result<DataInfo> {
        let dataset = self.store.active()?;
        Ok(DataInfo {
            rows: dataset.n_rows(),
            columns: dataset.n_cols(),
            column_names: dataset.column_names(),
        })
    }

    pub fn profile(&self) -> Result<Profile> {
        let dataset = self.store.active()?;
        info!("Generating data profile");
        Ok(profile::profile(&dataset, self.config.report.percentage_decimals))
    }

    pub fn visualize(&self, spec: &ChartSpec) -> Result<ChartData> {
        let dataset = self.store.active()?;
        info!("Building {:?} chart for {}", spec.kind, spec.x);
        chart::visualize(&dataset, spec, self.config.charts.histogram_bins)
    }

    pub fn train(&self, request: &ModelRequest) -> Result<ModelResult> {
        let dataset = self.store.active()?;
        let result = regression::train(&dataset, request, self.config.model.seed)
            .inspect_err(|e| warn!("Error training model: {e}"))?;
        match result.r2_score {
            Some(r2) => info!("Model trained successfully. R² Score: {r2:.4}"),
            None => info!("Model trained successfully. R² undefined on the test set"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::chart::ChartKind;
    use crate::error::EngineError;

    const CSV: &[u8] = b"num,cat\n1,A\n2,B\n,A\n4,\n5,B\n";

    fn loaded() -> Engine {
        let engine = Engine::default();
        engine.upload_bytes(CSV, Some("test.csv"), None, None).unwrap();
        engine
    }

    #[test]
    fn test_upload_summary() {
        let engine = Engine::default();
        let summary = engine.upload_bytes(CSV, Some("test.csv"), None, None).unwrap();
        assert_eq!(summary.shape, [5, 2]);
        assert_eq!(summary.column_names, vec!["num", "cat"]);
        assert_eq!(summary.missing["num"], 1);
        assert_eq!(summary.preview.len(), 5);
        assert_eq!(summary.preview[2]["num"], serde_json::Value::Null);
        let keys: Vec<&String> = summary.preview[0].keys().collect();
        assert_eq!(keys, vec!["num", "cat"]);
        assert_eq!(summary.dtypes.keys().collect::<Vec<_>>(), vec!["num", "cat"]);
        assert_eq!(summary.missing.keys().collect::<Vec<_>>(), vec!["num", "cat"]);
    }

    #[test]
    fn test_operations_without_data() {
        let engine = Engine::default();
        assert!(matches!(engine.profile(), Err(EngineError::NoDataLoaded)));
        assert!(matches!(engine.info(), Err(EngineError::NoDataLoaded)));
        assert!(matches!(
            engine.clean(&CleanOptions::default()),
            Err(EngineError::NoDataLoaded)
        ));
    }

    #[test]
    fn test_clean_then_reset() {
        let engine = loaded();
        let cleaned = engine
            .clean(&CleanOptions {
                drop_nulls: true,
                ..CleanOptions::default()
            })
            .unwrap();
        assert_eq!(cleaned.shape, [3, 2]);
        assert_eq!(cleaned.transformations.len(), 1);

        let reset = engine.reset().unwrap();
        assert_eq!(reset.shape, [5, 2]);
        assert!(reset.transformations.is_empty());
    }

    #[test]
    fn test_failed_upload_keeps_previous_dataset() {
        let engine = loaded();
        let err = engine.upload_bytes(b"a,b\n", Some("bad.csv"), None, None).unwrap_err();
        assert_eq!(err.kind(), "empty_file");
        assert_eq!(engine.info().unwrap().rows, 5);
    }

    #[test]
    fn test_cancelled_upload_keeps_previous_dataset() {
        let engine = loaded();
        let token = CancelToken::new();
        token.cancel();
        let err = engine
            .upload_bytes(b"x\n1\n2\n", Some("other.csv"), None, Some(&token))
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(engine.info().unwrap().column_names, vec!["num", "cat"]);
    }

    #[test]
    fn test_profile_matches_upload_shape() {
        let engine = Engine::default();
        let summary = engine.upload_bytes(CSV, Some("test.csv"), None, None).unwrap();
        let profile = engine.profile().unwrap();
        assert_eq!([profile.rows, profile.columns], summary.shape);
    }

    #[test]
    fn test_visualize_reads_active_dataset() {
        let engine = loaded();
        engine
            .clean(&CleanOptions {
                drop_nulls: true,
                ..CleanOptions::default()
            })
            .unwrap();
        let data = engine
            .visualize(&ChartSpec {
                kind: ChartKind::Bar,
                x: "cat".into(),
                y: None,
            })
            .unwrap();
        let ChartData::Categories { counts, .. } = data else {
            panic!("expected categories");
        };
        assert_eq!(counts.iter().sum::<usize>(), 3);
    }
}
