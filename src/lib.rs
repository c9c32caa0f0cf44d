//! # datakit
//!
//! Compiler for embodied-robotics trajectory datasets.
//!
//! datakit reads episodes from a source adapter, runs them through a
//! transform chain and a validation runner, and writes a sharded dataset:
//! parquet step shards, per-camera video shards, an episode index and a
//! run manifest sealed with SHA-256 checksums.
//!
//! ## Quick Start
//!
//! ```ignore
//! use datakit::prelude::*;
//!
//! // Compile a JSONL source with the default pipeline
//! let (dataset, result) = Dataset::builder()
//!     .config(Config::default())
//!     .compile(&mut JsonlAdapter::new("./source"), "./out")?;
//! assert!(result.success);
//!
//! // Query the index
//! let long = dataset.query(&QueryFilter::all().steps(Some(100), None))?;
//!
//! // Materialize a slice
//! dataset.slice(&QueryFilter::all().in_split(Split::Val), "./val", SliceMode::Copy, "val")?;
//!
//! // Re-hash the outputs
//! dataset.verify()?;
//! ```
//!
//! ## Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | [`datakit_core`] | Episode model, dataset spec, splits, stats, task catalog |
//! | [`datakit_transform`] | Episode transforms and the chain that runs them |
//! | [`datakit_validate`] | Validators, the runner and validation reports |
//! | [`datakit_storage`] | Parquet and video shard writers, index table, metadata |
//! | [`datakit_index`] | Index queries, slices and mixtures |
//! | [`datakit_durability`] | Run manifest, checksums and the finalizer |
//! | [`datakit_engine`] | Config, adapters, stage registry and the compiler |

#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;

pub mod logging;
pub mod prelude;

pub use dataset::{Dataset, DatasetBuilder};
pub use error::{Error, Result};
pub use logging::LogFormat;

pub use datakit_core;
pub use datakit_durability;
pub use datakit_engine;
pub use datakit_index;
pub use datakit_storage;
pub use datakit_transform;
pub use datakit_validate;
