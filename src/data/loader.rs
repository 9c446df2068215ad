use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::util::pretty::pretty_format_batches;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::infer::KindInference;
use super::model::{Column, Dataset, Value};
use crate::config::IngestConfig;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Tabular upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Delimited text; the delimiter (`,` `\t` `;` `|`) is sniffed from the header.
    #[serde(alias = "tsv")]
    Csv,
    /// Records-oriented JSON: `[{ "col": value, ... }, ...]`.
    Json,
    Parquet,
}

impl Format {
    /// Format implied by a file name extension, if any.
    ///
    /// Spreadsheet extensions are recognised only to be rejected.
    pub fn from_name(name: &str) -> Result<Option<Self>> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(Some(Format::Csv)),
            "json" => Ok(Some(Format::Json)),
            "parquet" | "pq" => Ok(Some(Format::Parquet)),
            "xlsx" | "xls" | "xlsm" | "ods" => Err(EngineError::unsupported(format!(
                "spreadsheet files (.{ext}) are not supported, export to CSV first"
            ))),
            _ => Ok(None),
        }
    }

    /// Guess the format from leading bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"PAR1") {
            return Format::Parquet;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') => Format::Json,
            _ => Format::Csv,
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation and bounds
// ---------------------------------------------------------------------------

/// Caller-held flag that aborts an in-flight ingest.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a loader needs besides the bytes.
pub struct IngestOptions<'a> {
    pub config: &'a IngestConfig,
    pub inference: &'a dyn KindInference,
    pub cancel: Option<&'a CancelToken>,
}

/// Row/time/cancel checks applied while parsing.
struct Budget<'a> {
    max_rows: usize,
    started: Instant,
    timeout: Option<Duration>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Budget<'a> {
    fn new(opts: &IngestOptions<'a>) -> Self {
        Self {
            max_rows: opts.config.max_rows,
            started: Instant::now(),
            timeout: opts.config.timeout(),
            cancel: opts.cancel,
        }
    }

    fn check(&self, rows_so_far: usize) -> Result<()> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(EngineError::Cancelled);
        }
        if rows_so_far > self.max_rows {
            return Err(EngineError::LimitExceeded(format!(
                "more than {} rows",
                self.max_rows
            )));
        }
        if let Some(limit) = self.timeout {
            if self.started.elapsed() > limit {
                return Err(EngineError::LimitExceeded(format!(
                    "ingest took longer than {}s",
                    limit.as_secs()
                )));
            }
        }
        Ok(())
    }
}

/// Lower-cased cell contents that mean "missing".
struct MissingTokens(HashSet<String>);

impl MissingTokens {
    fn new(config: &IngestConfig) -> Self {
        Self(
            config
                .missing_tokens
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
        )
    }

    fn cell(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.0.contains(&trimmed.to_ascii_lowercase()) {
            Value::Missing
        } else {
            Value::Text(raw.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a dataset from a file. The declared format wins, then the
/// extension, then the leading bytes.
pub fn load_file(path: &Path, declared: Option<Format>, opts: &IngestOptions<'_>) -> Result<Dataset> {
    let size = std::fs::metadata(path)?.len();
    if size > opts.config.max_bytes {
        return Err(EngineError::LimitExceeded(format!(
            "file is {size} bytes, limit is {}",
            opts.config.max_bytes
        )));
    }
    let bytes = std::fs::read(path)?;
    let name = path.file_name().and_then(|n| n.to_str());
    load_bytes(&bytes, name, declared, opts)
}

/// Load a dataset from an in-memory upload.
pub fn load_bytes(
    bytes: &[u8],
    name: Option<&str>,
    declared: Option<Format>,
    opts: &IngestOptions<'_>,
) -> Result<Dataset> {
    if bytes.len() as u64 > opts.config.max_bytes {
        return Err(EngineError::LimitExceeded(format!(
            "upload is {} bytes, limit is {}",
            bytes.len(),
            opts.config.max_bytes
        )));
    }

    let by_name = match name {
        Some(n) => Format::from_name(n)?,
        None => None,
    };
    let format = declared.or(by_name).unwrap_or_else(|| Format::sniff(bytes));
    debug!("Loading {} bytes as {format:?}", bytes.len());

    let raw = match format {
        Format::Csv => read_delimited(bytes, opts)?,
        Format::Json => read_json(bytes, opts)?,
        Format::Parquet => read_parquet(bytes, opts)?,
    };
    raw.into_dataset(opts.inference)
}

// ---------------------------------------------------------------------------
// Raw table – parsed cells before kind inference
// ---------------------------------------------------------------------------

struct RawTable {
    headers: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl RawTable {
    fn new(headers: Vec<String>) -> Self {
        let columns = headers.iter().map(|_| Vec::new()).collect();
        Self { headers, columns }
    }

    fn n_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    fn into_dataset(self, inference: &dyn KindInference) -> Result<Dataset> {
        if self.headers.is_empty() {
            return Err(EngineError::empty_file("no columns found"));
        }
        if self.n_rows() == 0 {
            return Err(EngineError::empty_file("no data rows found"));
        }

        let columns = self
            .headers
            .into_iter()
            .zip(self.columns)
            .map(|(name, cells)| {
                let kind = inference.infer(&name, &cells);
                Column::coerce(name, kind, cells)
            })
            .collect::<Result<Vec<_>>>()?;

        Dataset::new(columns)
    }
}

fn header_name(raw: &str, index: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("Unnamed: {index}")
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// Pick the delimiter that occurs most often in the header line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
    [b',', b'\t', b';', b'|']
        .into_iter()
        .map(|d| (d, header.iter().filter(|&&b| b == d).count()))
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(_, n)| n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Header row with column names, one record per line, every record the
/// same width.
fn read_delimited(bytes: &[u8], opts: &IngestOptions<'_>) -> Result<RawTable> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(EngineError::empty_file("file is empty"));
    }
    let delimiter = sniff_delimiter(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::parse(format!("reading header: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, h)| header_name(h, i))
        .collect();

    let missing = MissingTokens::new(opts.config);
    let budget = Budget::new(opts);
    let mut table = RawTable::new(headers);

    for (row_no, result) in reader.records().enumerate() {
        budget.check(row_no + 1)?;
        let record = result.map_err(|e| EngineError::parse(format!("row {}: {e}", row_no + 1)))?;
        for (col, field) in table.columns.iter_mut().zip(record.iter()) {
            col.push(missing.cell(field));
        }
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "region": "north", "units": 12, "price": 3.5 },
///   { "region": "south", "units": null, "price": 4.0 }
/// ]
/// ```
///
/// Columns appear in first-seen order; keys absent from a record are missing.
fn read_json(bytes: &[u8], opts: &IngestOptions<'_>) -> Result<RawTable> {
    let root: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| EngineError::parse(format!("invalid JSON: {e}")))?;
    let records = root
        .as_array()
        .ok_or_else(|| EngineError::parse("expected a top-level JSON array of records"))?;

    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| EngineError::parse(format!("record {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let missing = MissingTokens::new(opts.config);
    let budget = Budget::new(opts);
    let mut table = RawTable::new(headers);

    for (i, rec) in records.iter().enumerate() {
        budget.check(i + 1)?;
        // Every record was checked to be an object above.
        let Some(obj) = rec.as_object() else { continue };
        for (name, col) in table.headers.iter().zip(table.columns.iter_mut()) {
            let cell = match obj.get(name) {
                None | Some(JsonValue::Null) => Value::Missing,
                Some(JsonValue::Number(n)) => n.as_f64().map(Value::Number).unwrap_or(Value::Missing),
                Some(JsonValue::String(s)) => missing.cell(s),
                Some(JsonValue::Bool(b)) => Value::Text(b.to_string()),
                Some(other) => {
                    return Err(EngineError::unsupported(format!(
                        "record {i}, column '{name}': nested value {other}"
                    )))
                }
            };
            col.push(cell);
        }
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet file. Numeric columns (ints, floats, decimals) stay
/// numeric, strings/booleans/dates/timestamps are read as text. Nested
/// columns (lists, structs, maps) are rejected.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn read_parquet(bytes: &[u8], opts: &IngestOptions<'_>) -> Result<RawTable> {
    let data = bytes::Bytes::copy_from_slice(bytes);
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| EngineError::parse(format!("reading parquet metadata: {e}")))?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| EngineError::parse(format!("building parquet reader: {e}")))?;

    let missing = MissingTokens::new(opts.config);
    let budget = Budget::new(opts);
    let mut table = RawTable::new(headers);

    for batch_result in reader {
        let batch = batch_result.map_err(|e| EngineError::parse(format!("reading record batch: {e}")))?;
        budget.check(table.n_rows() + batch.num_rows())?;
        if table.n_rows() == 0 && log::log_enabled!(log::Level::Trace) {
            if let Ok(shown) = pretty_format_batches(&[batch.slice(0, batch.num_rows().min(5))]) {
                log::trace!("First parquet rows:\n{shown}");
            }
        }

        for (idx, col) in table.columns.iter_mut().enumerate() {
            let name = &table.headers[idx];
            col.extend(arrow_cells(batch.column(idx), name, &missing)?);
        }
    }

    Ok(table)
}

/// Convert one Arrow column into cells.
fn arrow_cells(col: &ArrayRef, name: &str, missing: &MissingTokens) -> Result<Vec<Value>> {
    let data_type = col.data_type();

    if matches!(data_type, DataType::Null) {
        return Ok(vec![Value::Missing; col.len()]);
    }

    if data_type.is_numeric() {
        let floats = cast(col, &DataType::Float64)
            .map_err(|e| EngineError::unsupported(format!("column '{name}': {e}")))?;
        let floats = floats
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| EngineError::unsupported(format!("column '{name}': expected Float64")))?;
        return Ok(floats
            .iter()
            .map(|v| match v {
                Some(f) if !f.is_nan() => Value::Number(f),
                _ => Value::Missing,
            })
            .collect());
    }

    let textual = matches!(
        data_type,
        DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Utf8View
            | DataType::Boolean
            | DataType::Date32
            | DataType::Date64
            | DataType::Timestamp(_, _)
            | DataType::Dictionary(_, _)
    );
    if !textual {
        return Err(EngineError::unsupported(format!(
            "column '{name}' has type {data_type:?}"
        )));
    }

    let strings = cast(col, &DataType::Utf8)
        .map_err(|e| EngineError::unsupported(format!("column '{name}': {e}")))?;
    let strings = strings
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| EngineError::unsupported(format!("column '{name}': expected Utf8")))?;
    Ok(strings
        .iter()
        .map(|v| v.map(|s| missing.cell(s)).unwrap_or(Value::Missing))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, ListBuilder, Float64Builder};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use super::*;
    use crate::data::infer::NumericIfAllParse;
    use crate::data::model::ColumnKind;

    fn load(bytes: &[u8], name: Option<&str>) -> Result<Dataset> {
        let config = IngestConfig::default();
        let opts = IngestOptions {
            config: &config,
            inference: &NumericIfAllParse,
            cancel: None,
        };
        load_bytes(bytes, name, None, &opts)
    }

    fn parquet_bytes(batch: &RecordBatch) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
        buf
    }

    #[test]
    fn test_csv_kinds_and_missing() {
        let ds = load(b"num,cat\n1,A\n2,B\n,A\n4, \n5,B\n", Some("t.csv")).unwrap();
        assert_eq!(ds.shape(), [5, 2]);
        let num = ds.column("num").unwrap();
        assert_eq!(num.kind(), ColumnKind::Numeric);
        assert_eq!(num.missing_count(), 1);
        let cat = ds.column("cat").unwrap();
        assert_eq!(cat.kind(), ColumnKind::Categorical);
        assert_eq!(cat.missing_count(), 1);
    }

    #[test]
    fn test_na_tokens_are_missing() {
        let ds = load(b"a,b\nNaN,x\n1,null\nN/A,y\n", None).unwrap();
        assert_eq!(ds.column("a").unwrap().missing_count(), 2);
        assert_eq!(ds.column("a").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(ds.column("b").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_tab_delimiter_sniffed() {
        let ds = load(b"a\tb\n1\tx\n2\ty\n", Some("t.tsv")).unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_ragged_csv_is_parse_error() {
        let err = load(b"a,b\n1,2\n3\n", Some("t.csv")).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_header_only_is_empty_file() {
        let err = load(b"a,b\n", Some("t.csv")).unwrap_err();
        assert_eq!(err.kind(), "empty_file");
        let err = load(b"", Some("t.csv")).unwrap_err();
        assert_eq!(err.kind(), "empty_file");
    }

    #[test]
    fn test_duplicate_header_is_parse_error() {
        let err = load(b"a,a\n1,2\n", Some("t.csv")).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_excel_rejected() {
        let err = load(b"PK\x03\x04", Some("book.xlsx")).unwrap_err();
        assert_eq!(err.kind(), "unsupported_type");
    }

    #[test]
    fn test_json_records() {
        let ds = load(
            br#"[{"x": 1, "c": "a"}, {"x": null, "c": "b", "extra": true}]"#,
            None,
        )
        .unwrap();
        assert_eq!(ds.column_names(), vec!["x", "c", "extra"]);
        assert_eq!(ds.column("x").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(ds.column("extra").unwrap().missing_count(), 1);
        assert_eq!(ds.column("extra").unwrap().kind(), ColumnKind::Categorical);
    }

    #[test]
    fn test_json_nested_value_unsupported() {
        let err = load(br#"[{"x": [1, 2]}]"#, Some("t.json")).unwrap_err();
        assert_eq!(err.kind(), "unsupported_type");
    }

    #[test]
    fn test_json_not_array_is_parse_error() {
        let err = load(br#"{"x": 1}"#, Some("t.json")).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_parquet_flat_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
            ],
        )
        .unwrap();

        let ds = load(&parquet_bytes(&batch), None).unwrap();
        assert_eq!(ds.shape(), [3, 2]);
        assert_eq!(ds.column("id").unwrap().numbers(), vec![1.0, 2.0, 3.0]);
        assert_eq!(ds.column("name").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_parquet_list_column_unsupported() {
        let mut builder = ListBuilder::new(Float64Builder::new());
        builder.values().append_value(1.0);
        builder.append(true);
        let list = builder.finish();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "xs",
            list.data_type().clone(),
            true,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(list)]).unwrap();

        let err = load(&parquet_bytes(&batch), Some("t.parquet")).unwrap_err();
        assert_eq!(err.kind(), "unsupported_type");
    }

    #[test]
    fn test_row_limit_and_cancel() {
        let config = IngestConfig {
            max_rows: 2,
            ..IngestConfig::default()
        };
        let opts = IngestOptions {
            config: &config,
            inference: &NumericIfAllParse,
            cancel: None,
        };
        let err = load_bytes(b"a\n1\n2\n3\n", None, None, &opts).unwrap_err();
        assert_eq!(err.kind(), "limit_exceeded");

        let token = CancelToken::new();
        token.cancel();
        let config = IngestConfig::default();
        let opts = IngestOptions {
            config: &config,
            inference: &NumericIfAllParse,
            cancel: Some(&token),
        };
        let err = load_bytes(b"a\n1\n", None, None, &opts).unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[test]
    fn test_byte_limit() {
        let config = IngestConfig {
            max_bytes: 4,
            ..IngestConfig::default()
        };
        let opts = IngestOptions {
            config: &config,
            inference: &NumericIfAllParse,
            cancel: None,
        };
        let err = load_bytes(b"a,b\n1,2\n", None, None, &opts).unwrap_err();
        assert_eq!(err.kind(), "limit_exceeded");
    }
}
