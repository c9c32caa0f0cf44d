//! Index Integration Tests
//!
//! Queries, slices, dataset cards and checksum verification against
//! compiled datasets.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test index
//! cargo test --test index slice::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod card;
mod checksums;
mod query;
mod slice;

use common::*;
use datakit::prelude::*;
use tempfile::TempDir;

/// Twelve compiled synthetic episodes in a fresh directory.
pub fn built() -> (TempDir, Dataset) {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, result) = compile(synthetic_episodes(12, 42), test_config(), dir.path());
    assert!(result.success);
    (dir, dataset)
}
