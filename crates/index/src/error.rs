//! Index layer errors.

use datakit_core::ConfigError;
use datakit_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Query or slice failure.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No index table under the dataset root
    #[error("no episode index found under {0}")]
    IndexNotFound(PathBuf),

    /// Bad filter or mixture definition
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Index table or shard I/O
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Filesystem failure while materializing a slice
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Slice request that cannot be satisfied
    #[error("invalid slice: {0}")]
    InvalidSlice(String),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
