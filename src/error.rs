//! Unified error type for datakit.
//!
//! Every workspace crate has its own error enum. This module folds them
//! into one [`Error`] with a small, stable set of categories so callers of
//! the facade can match on what went wrong without importing every crate.

use datakit_core::{ConfigError, CoreError};
use datakit_durability::{DurabilityError, ManifestError};
use datakit_engine::{AdapterError, CompileError};
use datakit_index::IndexError;
use datakit_storage::StorageError;
use datakit_validate::ReportError;
use thiserror::Error;

/// All datakit errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Pipeline, filter, selector or configuration rejected before any
    /// episode was read
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Source could not be read or decoded
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Shard, video, index table or metadata write/read failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Written offsets are inconsistent or files no longer match their
    /// checksums
    #[error("verification failed: {}", .0.join("; "))]
    Verification(Vec<String>),

    /// Manifest lifecycle violation
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Dataset root or index missing
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (bug or environment problem)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for datakit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a configuration error.
    ///
    /// Configuration errors surface before any episode is consumed and
    /// leave no output behind.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this is a fatal I/O failure.
    ///
    /// A compilation run that hits one of these is aborted and its manifest
    /// sealed as failed; nothing is retried.
    pub fn is_fatal_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Storage(_) | Error::Adapter(_))
    }

    /// Check if this is an offset or checksum verification failure.
    pub fn is_verification(&self) -> bool {
        matches!(self, Error::Verification(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(c) => Error::Config(c),
            CoreError::Serialization(msg) => Error::Serialization(msg),
            CoreError::InvalidSchemaVersion(v) => {
                Error::Serialization(format!("invalid schema version: {}", v))
            }
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(io) => Error::Io(io),
            StorageError::Serialization(msg) => Error::Serialization(msg),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<AdapterError> for Error {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Config(c) => Error::Config(c),
            other => Error::Adapter(other.to_string()),
        }
    }
}

impl From<ManifestError> for Error {
    fn from(e: ManifestError) -> Self {
        Error::Manifest(e.to_string())
    }
}

impl From<DurabilityError> for Error {
    fn from(e: DurabilityError) -> Self {
        match e {
            DurabilityError::Io(io) => Error::Io(io),
            DurabilityError::Serialization(s) => Error::Serialization(s.to_string()),
            DurabilityError::Storage(s) => s.into(),
            DurabilityError::Manifest(m) => m.into(),
            DurabilityError::Verification(v) => Error::Verification(v),
        }
    }
}

impl From<IndexError> for Error {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::IndexNotFound(path) => {
                Error::NotFound(format!("episode index under {}", path.display()))
            }
            IndexError::Config(c) => Error::Config(c),
            IndexError::Storage(s) => s.into(),
            IndexError::Io(io) => Error::Io(io),
            IndexError::Serialization(s) => Error::Serialization(s.to_string()),
            IndexError::InvalidSlice(msg) => Error::Config(ConfigError::Invalid(msg)),
        }
    }
}

impl From<ReportError> for Error {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Io(io) => Error::Io(io),
            ReportError::Serialization(s) => Error::Serialization(s.to_string()),
        }
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Config(c) => Error::Config(c),
            CompileError::Adapter(a) => a.into(),
            CompileError::Storage(s) => s.into(),
            CompileError::Report(r) => r.into(),
            CompileError::Finalize(d) => d.into(),
            CompileError::Io(io) => Error::Io(io),
            CompileError::Serialization(s) => Error::Serialization(s.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
