//! Finalization errors.

use crate::manifest::RunStatus;
use datakit_storage::StorageError;
use thiserror::Error;

/// Manifest lifecycle violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The manifest already left the running state
    #[error("manifest {build_id} already sealed as {status}")]
    AlreadySealed {
        /// Build id of the manifest
        build_id: String,
        /// Status it was sealed with
        status: RunStatus,
    },
}

/// Failure while verifying, checksumming or sealing a build.
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Index or shard could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Manifest sealed twice
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Written output is internally inconsistent
    #[error("offset verification failed: {}", .0.join("; "))]
    Verification(Vec<String>),
}

impl DurabilityError {
    /// Verification violations, if this is a verification failure
    pub fn violations(&self) -> &[String] {
        match self {
            DurabilityError::Verification(v) => v,
            _ => &[],
        }
    }
}

/// Result type for durability operations.
pub type Result<T> = std::result::Result<T, DurabilityError>;
