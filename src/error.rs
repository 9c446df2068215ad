use thiserror::Error;

// ---------------------------------------------------------------------------
// Engine error taxonomy
// ---------------------------------------------------------------------------

/// Every failure an engine operation can report.
///
/// All variants are recoverable: the request layer turns them into
/// `{ "error": ..., "kind": ... }` and the store keeps its last committed
/// dataset.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No data loaded")]
    NoDataLoaded,

    #[error("Failed to parse file: {0}")]
    Parse(String),

    #[error("File contains no data: {0}")]
    EmptyFile(String),

    #[error("Unsupported data: {0}")]
    UnsupportedType(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Scatter charts require a y column")]
    MissingYColumn,

    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    #[error("Target column '{0}' cannot also be a feature")]
    TargetInFeatures(String),

    #[error("Test size must lie strictly between 0 and 1, got {0}")]
    InvalidTestFraction(f64),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model fitting failed: {0}")]
    ModelFit(String),

    #[error("Ingest cancelled")]
    Cancelled,

    #[error("Ingest limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn empty_file(msg: impl Into<String>) -> Self {
        Self::EmptyFile(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }

    pub fn invalid_column(msg: impl Into<String>) -> Self {
        Self::InvalidColumn(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    /// Stable machine-readable tag for the request layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoDataLoaded => "no_data_loaded",
            Self::Parse(_) => "parse_error",
            Self::EmptyFile(_) => "empty_file",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::UnknownColumn(_) => "unknown_column",
            Self::MissingYColumn => "missing_y_column",
            Self::InvalidColumn(_) => "invalid_column",
            Self::TargetInFeatures(_) => "target_in_features",
            Self::InvalidTestFraction(_) => "invalid_test_fraction",
            Self::InsufficientData(_) => "insufficient_data",
            Self::ModelFit(_) => "model_fit",
            Self::Cancelled => "cancelled",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serde(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
