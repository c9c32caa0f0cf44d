//! Error types for the compilation engine.

use datakit_core::ConfigError;
use datakit_durability::DurabilityError;
use datakit_storage::StorageError;
use datakit_validate::ReportError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reading from an episode source.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// I/O error reading the source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be decoded
    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        /// Source file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Decoder message
        reason: String,
    },

    /// The source has no such split
    #[error("unknown split: {0}")]
    UnknownSplit(String),

    /// Selector or source configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Failure of a compilation run.
///
/// Everything except [`CompileError::Config`] is fatal to a run that has
/// already started: the manifest is sealed as failed before the error is
/// returned.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Pipeline or configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Source failure
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Writer failure
    #[error("writer error: {0}")]
    Storage(#[from] StorageError),

    /// Validation report could not be persisted
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// Offset verification, checksums or manifest sealing failed
    #[error("finalize error: {0}")]
    Finalize(#[from] DurabilityError),

    /// I/O error outside the writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config could not be serialized for the manifest
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompileError {
    /// Check if this error was raised before any episode was consumed
    pub fn is_config(&self) -> bool {
        matches!(self, CompileError::Config(_))
            || matches!(self, CompileError::Adapter(AdapterError::Config(_)))
    }

    /// Check if this is an offset verification failure
    pub fn is_verification(&self) -> bool {
        matches!(self, CompileError::Finalize(DurabilityError::Verification(_)))
    }
}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;
