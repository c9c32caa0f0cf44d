//! Build finalization for compiled datasets.
//!
//! - [`manifest`]: [`RunManifest`] and its seal-once lifecycle
//! - [`checksum`]: streaming SHA-256 of produced files
//! - [`finalizer`]: offset verification, checksums and sealing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod finalizer;
pub mod manifest;

pub use checksum::{compute_checksums, sha256_file, verify_checksums, write_checksums, Checksums};
pub use error::{DurabilityError, ManifestError, Result};
pub use finalizer::{FinalizeOutcome, Finalizer, FinalizerOptions};
pub use manifest::{build_id, RunManifest, RunStatus};
