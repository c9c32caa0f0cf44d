//! Storage errors.
//!
//! Every variant is fatal for a compilation run: a failed shard flush or
//! encoder leaves the dataset inconsistent, so nothing here is retried.

use thiserror::Error;

/// Artifact write/read failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encode/decode failure
    #[error("parquet error: {0}")]
    Parquet(String),

    /// Arrow array/batch construction failure
    #[error("arrow error: {0}")]
    Arrow(String),

    /// Video encoder failed or produced an unexpected result
    #[error("video encoder error: {0}")]
    Encoder(String),

    /// JSON encode/decode failure for metadata files
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Table is missing a column or has the wrong type
    #[error("schema error: {0}")]
    Schema(String),

    /// Writer used out of order (write before begin, write after finalize)
    #[error("invalid writer state: {0}")]
    InvalidState(String),
}

impl From<parquet::errors::ParquetError> for StorageError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        StorageError::Parquet(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for StorageError {
    fn from(e: arrow::error::ArrowError) -> Self {
        StorageError::Arrow(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<datakit_core::CoreError> for StorageError {
    fn from(e: datakit_core::CoreError) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
