use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or querying the permit dataset.
///
/// Empty results and unknown grouping columns are not errors; the query
/// engine reports those as plain text.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("malformed dataset: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
