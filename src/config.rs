//! Engine configuration.
//!
//! Layered with `figment`: defaults -> TOML file -> `YUGEN_*` environment.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "yugen.toml";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub charts: ChartConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Bounds and parsing rules for uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Largest accepted row count.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Wall-clock budget for a single ingest (none = unbounded).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Cell contents treated as missing, compared case-insensitively after trimming.
    #[serde(default = "default_missing_tokens")]
    pub missing_tokens: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_rows: default_max_rows(),
            timeout_secs: None,
            missing_tokens: default_missing_tokens(),
        }
    }
}

impl IngestConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_max_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_max_rows() -> usize {
    5_000_000
}

fn default_missing_tokens() -> Vec<String> {
    ["", "na", "n/a", "nan", "null", "none", "#n/a"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Shape of the dataset summaries returned by upload/clean/reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Decimal places kept in missing-value percentages.
    #[serde(default = "default_percentage_decimals")]
    pub percentage_decimals: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            preview_rows: default_preview_rows(),
            percentage_decimals: default_percentage_decimals(),
        }
    }
}

fn default_preview_rows() -> usize {
    5
}

fn default_percentage_decimals() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Equal-width bins used for numeric histograms.
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            histogram_bins: default_histogram_bins(),
        }
    }
}

fn default_histogram_bins() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Seed for the train/test shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Test fraction used when a request omits one.
    #[serde(default = "default_test_size")]
    pub default_test_size: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            default_test_size: default_test_size(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.2
}

/// Load configuration.
///
/// An explicit `path` must exist; otherwise `yugen.toml` in the working
/// directory is merged when present. Environment variables such as
/// `YUGEN_CHARTS__HISTOGRAM_BINS=20` override both.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    match path {
        Some(p) => {
            if !p.exists() {
                return Err(EngineError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Toml::file(p));
        }
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed("YUGEN_").split("__"));

    let config: EngineConfig = figment
        .extract()
        .map_err(|e| EngineError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

impl EngineConfig {
    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.charts.histogram_bins == 0 {
            return Err(EngineError::Config(
                "charts.histogram_bins must be at least 1".into(),
            ));
        }
        let t = self.model.default_test_size;
        if !(t > 0.0 && t < 1.0) {
            return Err(EngineError::Config(format!(
                "model.default_test_size must lie in (0, 1), got {t}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.report.preview_rows, 5);
        assert_eq!(config.report.percentage_decimals, 2);
        assert_eq!(config.charts.histogram_bins, 10);
        assert_eq!(config.model.seed, 42);
        assert!(config.ingest.missing_tokens.iter().any(|t| t == "nan"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[charts]\nhistogram_bins = 4\n\n[model]\nseed = 7").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.charts.histogram_bins, 4);
        assert_eq!(config.model.seed, 7);
        assert_eq!(config.report.preview_rows, 5);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_zero_bins_rejected() {
        let mut config = EngineConfig::default();
        config.charts.histogram_bins = 0;
        assert!(config.validate().is_err());
    }
}
