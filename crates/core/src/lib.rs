//! Data model for the datakit compiler.
//!
//! This crate defines the canonical in-memory form of trajectory data:
//! - [`Step`] and [`Episode`]: time-ordered observations and actions
//! - [`DatasetSpec`]: dataset schema and build provenance
//! - [`TaskCatalog`]: bijective task text <-> id mapping
//! - [`EpisodeIndexRecord`]: physical placement of a written episode
//! - [`StatsAccumulator`]: streaming per-feature statistics
//! - [`split_for`]: deterministic split assignment
//!
//! Every other crate in the workspace depends on this one and nothing else
//! in the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod episode;
pub mod error;
pub mod index_record;
pub mod keys;
pub mod spec;
pub mod split;
pub mod stats;
pub mod task_catalog;
pub mod value;
pub mod version;

pub use episode::{Episode, Metadata, Step};
pub use error::{ConfigError, CoreError, Result};
pub use index_record::{join_camera_set, EpisodeIndexRecord, VideoLocator};
pub use spec::{ActionSpaceType, DatasetSpec, FeatureSpec};
pub use split::{split_bucket, split_for, Split, SplitRatios};
pub use stats::{DatasetStats, FeatureStats, RunningStats, StatsAccumulator};
pub use task_catalog::{TaskCatalog, TaskEntry};
pub use value::{DType, Tensor, TensorData, Value};
pub use version::{SchemaVersion, CODEBASE_VERSION, CURRENT_SCHEMA_VERSION};
