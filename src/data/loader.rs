use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use log::{debug, info};
use once_cell::sync::OnceCell;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::error::{DataError, Result};
use super::model::{CellValue, PermitTable, TOTAL_COLUMN, normalize_column_names};

// ---------------------------------------------------------------------------
// Reader options
// ---------------------------------------------------------------------------

/// Character encoding of a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[default]
    Latin1,
    Utf8,
}

impl TextEncoding {
    fn decode(self, bytes: &[u8]) -> std::result::Result<String, std::str::Utf8Error> {
        match self {
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Utf8 => std::str::from_utf8(bytes).map(str::to_owned),
        }
    }
}

/// How to parse delimited text. Defaults match the published PORTES files:
/// semicolon separated, Latin-1 encoded, header row present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub encoding: TextEncoding,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b';',
            encoding: TextEncoding::Latin1,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a permit table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` – delimited text with a header row (see [`CsvOptions`])
/// * `.json`         – `[{ "UF": "BA", "TOTAL": 3, ... }, ...]`
/// * `.parquet`      – one column per attribute
///
/// Column names are trimmed and upper-cased; a `TOTAL` column is coerced to
/// numbers with zero for anything missing or unparseable.
pub fn load_file(path: &Path, options: &CsvOptions) -> Result<PermitTable> {
    if !path.is_file() {
        return Err(DataError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" | "txt" => {
            let file = std::fs::File::open(path)?;
            read_csv(file, options)
        }
        "json" => {
            let text = std::fs::read_to_string(path)?;
            parse_json(&text)
        }
        "parquet" | "pq" => load_parquet(path),
        other => Err(DataError::UnsupportedExtension(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// Parse delimited text from any reader.
///
/// Short rows are padded with missing values; a row with more fields than the
/// header is rejected.
pub fn read_csv<R: Read>(input: R, options: &CsvOptions) -> Result<PermitTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| decode_field(options.encoding, h, 0))
        .collect::<Result<_>>()?;
    if headers.is_empty() {
        return Err(DataError::Malformed("no header row".into()));
    }

    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for (row_no, result) in reader.byte_records().enumerate() {
        let record = result?;
        let line = row_no + 2;
        if record.len() > headers.len() {
            return Err(DataError::Malformed(format!(
                "line {line}: expected {} fields, found {}",
                headers.len(),
                record.len()
            )));
        }
        for (col_idx, column) in raw_columns.iter_mut().enumerate() {
            let value = match record.get(col_idx) {
                Some(bytes) => decode_field(options.encoding, bytes, line)?,
                None => String::new(),
            };
            column.push(value);
        }
    }

    let columns = raw_columns.into_iter().map(infer_column).collect();
    Ok(build_table(headers, columns))
}

fn decode_field(encoding: TextEncoding, bytes: &[u8], line: usize) -> Result<String> {
    encoding
        .decode(bytes)
        .map_err(|e| DataError::Malformed(format!("line {line}: invalid UTF-8 ({e})")))
}

/// Markers read as a missing value (the usual dataframe defaults).
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_null_marker(s: &str) -> bool {
    NULL_MARKERS.contains(&s)
}

/// Pick one type for a whole column: integer if every present cell parses as
/// `i64`, float if every present cell parses as `f64`, text otherwise.
fn infer_column(raw: Vec<String>) -> Vec<CellValue> {
    let present = || raw.iter().filter(|s| !is_null_marker(s));

    if present().all(|s| s.trim().parse::<i64>().is_ok()) {
        return raw
            .iter()
            .map(|s| match s.trim().parse::<i64>() {
                Ok(i) if !is_null_marker(s) => CellValue::Integer(i),
                _ => CellValue::Null,
            })
            .collect();
    }

    if present().all(|s| s.trim().parse::<f64>().is_ok()) {
        return raw
            .iter()
            .map(|s| match s.trim().parse::<f64>() {
                Ok(f) if !is_null_marker(s) => CellValue::Float(f),
                _ => CellValue::Null,
            })
            .collect();
    }

    raw.into_iter()
        .map(|s| {
            if is_null_marker(&s) {
                CellValue::Null
            } else {
                CellValue::String(s)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "UF": "BA", "MUNICIPIO": "SALVADOR", "TOTAL": 12 },
///   ...
/// ]
/// ```
///
/// Columns appear in first-seen order; keys missing from a record are null.
pub fn parse_json(text: &str) -> Result<PermitTable> {
    let root: JsonValue = serde_json::from_str(text)?;
    let records = root
        .as_array()
        .ok_or_else(|| DataError::Malformed("expected a top-level JSON array".into()))?;

    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| DataError::Malformed(format!("record {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let columns = headers
        .iter()
        .map(|key| {
            records
                .iter()
                .map(|rec| rec.get(key).map_or(CellValue::Null, json_to_cell))
                .collect()
        })
        .collect();

    Ok(build_table(headers, columns))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file, one table column per Arrow field.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`); dictionary-encoded text is decoded.
fn load_parquet(path: &Path) -> Result<PermitTable> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];
    for batch_result in reader {
        let batch = batch_result?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            column.extend(arrow_column_values(batch.column(col_idx))?);
        }
    }

    Ok(build_table(headers, columns))
}

/// Convert one Arrow column into cell values.
fn arrow_column_values(col: &ArrayRef) -> Result<Vec<CellValue>> {
    let len = col.len();
    let values: Vec<CellValue> = match col.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let ints = cast(col, &DataType::Int64)?;
            let arr = ints.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| if arr.is_null(i) { CellValue::Null } else { CellValue::Integer(arr.value(i)) })
                .collect()
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = cast(col, &DataType::Float64)?;
            let arr = floats.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| {
                    if arr.is_null(i) || arr.value(i).is_nan() {
                        CellValue::Null
                    } else {
                        CellValue::Float(arr.value(i))
                    }
                })
                .collect()
        }
        DataType::Boolean => {
            let arr = col.as_boolean();
            (0..len)
                .map(|i| if arr.is_null(i) { CellValue::Null } else { CellValue::Bool(arr.value(i)) })
                .collect()
        }
        DataType::Utf8 => {
            let arr = col.as_string::<i32>();
            (0..len)
                .map(|i| if arr.is_null(i) { CellValue::Null } else { CellValue::String(arr.value(i).to_string()) })
                .collect()
        }
        _ => {
            // LargeUtf8, dictionaries, dates: render everything else as text.
            let text = cast(col, &DataType::Utf8)?;
            let arr = text.as_string::<i32>();
            (0..len)
                .map(|i| if arr.is_null(i) { CellValue::Null } else { CellValue::String(arr.value(i).to_string()) })
                .collect()
        }
    };
    Ok(values)
}

// ---------------------------------------------------------------------------
// Shared post-processing
// ---------------------------------------------------------------------------

/// Normalize headers and coerce `TOTAL`, then assemble the table.
fn build_table(raw_headers: Vec<String>, columns: Vec<Vec<CellValue>>) -> PermitTable {
    let names = normalize_column_names(&raw_headers);
    let columns = names
        .into_iter()
        .zip(columns)
        .map(|(name, values)| {
            if name == TOTAL_COLUMN {
                let coerced = coerce_total(values);
                (name, coerced)
            } else {
                (name, values)
            }
        })
        .collect();
    PermitTable::from_columns(columns)
}

/// Every `TOTAL` cell becomes a float; missing or non-numeric cells are zero.
fn coerce_total(values: Vec<CellValue>) -> Vec<CellValue> {
    values
        .into_iter()
        .map(|v| CellValue::Float(v.as_f64().unwrap_or(0.0)))
        .collect()
}

// ---------------------------------------------------------------------------
// Load-once cache
// ---------------------------------------------------------------------------

/// Where a [`DatasetCache`] gets its table from.
pub trait TableSource {
    /// Read and parse the whole table.
    fn read_table(&self) -> Result<PermitTable>;

    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;
}

/// A dataset file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub options: CsvOptions,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        FileSource {
            path: path.into(),
            options,
        }
    }
}

impl TableSource for FileSource {
    fn read_table(&self) -> Result<PermitTable> {
        load_file(&self.path, &self.options)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Owns the dataset and loads it at most once.
///
/// The first successful [`DatasetCache::table`] call reads the source; every
/// later call returns the same `Arc` without touching the source again. A
/// failed load leaves the cache empty so the next call retries.
pub struct DatasetCache<S: TableSource = FileSource> {
    source: S,
    table: OnceCell<Arc<PermitTable>>,
}

impl DatasetCache<FileSource> {
    /// Cache in front of a dataset file.
    pub fn open(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        DatasetCache::new(FileSource::new(path, options))
    }
}

impl<S: TableSource> DatasetCache<S> {
    pub fn new(source: S) -> Self {
        DatasetCache {
            source,
            table: OnceCell::new(),
        }
    }

    /// The loaded table, reading the source on first use.
    pub fn table(&self) -> Result<Arc<PermitTable>> {
        if let Some(table) = self.table.get() {
            debug!("dataset cache hit for {}", self.source.describe());
            return Ok(Arc::clone(table));
        }
        self.table
            .get_or_try_init(|| -> Result<Arc<PermitTable>> {
                let table = self.source.read_table()?;
                info!(
                    "loaded {} rows x {} columns from {}",
                    table.len(),
                    table.column_names().len(),
                    self.source.describe()
                );
                Ok(Arc::new(table))
            })
            .map(Arc::clone)
    }

    /// Whether the table has already been read.
    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
