//! Request/response contracts for the dashboard.
//!
//! Each request maps to one engine operation. Successes serialize the
//! operation's payload; failures become `{ "error": message, "kind": tag }`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::analysis::chart::{ChartKind, ChartSpec};
use crate::analysis::regression::ModelRequest;
use crate::data::clean::CleanOptions;
use crate::data::loader::Format;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// A file on disk, or inline text content (CSV/JSON) with an optional
    /// file name used for format detection.
    Upload {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        format: Option<Format>,
    },
    Clean(CleanOptions),
    Profile,
    Visualize {
        #[serde(rename = "type")]
        kind: ChartKind,
        x: String,
        #[serde(default)]
        y: Option<String>,
    },
    Train {
        /// Falls back to `model.default_test_size`.
        #[serde(default)]
        test_size: Option<f64>,
        target_column: String,
        feature_columns: Vec<String>,
    },
    Reset,
    Clear,
    Info,
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue> {
    Ok(serde_json::to_value(value)?)
}

fn dispatch(engine: &Engine, request: Request) -> Result<JsonValue> {
    match request {
        Request::Upload {
            path,
            content,
            name,
            format,
        } => {
            let summary = match (content, path) {
                (Some(text), _) => engine.upload_bytes(text.as_bytes(), name.as_deref(), format, None)?,
                (None, Some(path)) => engine.upload_file(&path, format, None)?,
                (None, None) => return Err(EngineError::empty_file("no file uploaded")),
            };
            to_json(&summary)
        }
        Request::Clean(options) => to_json(&engine.clean(&options)?),
        Request::Profile => to_json(&engine.profile()?),
        Request::Visualize { kind, x, y } => {
            let data = engine.visualize(&ChartSpec { kind, x, y })?;
            Ok(json!({ "data": to_json(&data)? }))
        }
        Request::Train {
            test_size,
            target_column,
            feature_columns,
        } => {
            let request = ModelRequest {
                test_size: test_size.unwrap_or(engine.config().model.default_test_size),
                target_column,
                feature_columns,
            };
            to_json(&engine.train(&request)?)
        }
        Request::Reset => to_json(&engine.reset()?),
        Request::Clear => {
            engine.clear();
            Ok(json!({ "cleared": true }))
        }
        Request::Info => to_json(&engine.info()?),
    }
}

/// Structured failure body.
pub fn error_body(error: &EngineError) -> JsonValue {
    json!({ "error": error.to_string(), "kind": error.kind() })
}

/// Run one request against the session, folding errors into the response.
pub fn handle(engine: &Engine, request: Request) -> JsonValue {
    dispatch(engine, request).unwrap_or_else(|e| error_body(&e))
}

/// Parse and run one JSON request line.
pub fn handle_line(engine: &Engine, line: &str) -> JsonValue {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(engine, request),
        Err(e) => json!({ "error": format!("Invalid request: {e}"), "kind": "bad_request" }),
    }
}
