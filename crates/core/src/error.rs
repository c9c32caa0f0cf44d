//! Error types shared by every datakit crate.
//!
//! Two families live here:
//!
//! - [`ConfigError`]: pipeline construction failures (unknown plugin names,
//!   bad parameters, malformed selectors or query patterns). These surface
//!   before any episode is consumed.
//! - [`CoreError`]: data-model failures (bad serialized form, incompatible
//!   schema version).
//!
//! Structural and quality problems in episodes are never errors; they are
//! reported as validation findings.

use thiserror::Error;

/// Failure while building a pipeline, filter or selector from configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Transform name not present in the registry
    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    /// Validator name not present in the registry
    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    /// Stage parameters failed to parse or were out of range
    #[error("invalid parameters for '{stage}': {reason}")]
    InvalidParams {
        /// Stage (transform or validator) name
        stage: String,
        /// What was wrong
        reason: String,
    },

    /// Episode selector could not be parsed
    #[error("invalid selector '{0}': expected \"[start:end]\"")]
    InvalidSelector(String),

    /// Query regex failed to compile
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        /// The offending pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Any other invalid configuration value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Data-model error.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Serialized form could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Schema version string is malformed
    #[error("invalid schema version: {0}")]
    InvalidSchemaVersion(String),

    /// Configuration error bubbled up through the data model
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

/// Result type for data-model operations.
pub type Result<T> = std::result::Result<T, CoreError>;
