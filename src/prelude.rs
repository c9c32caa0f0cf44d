//! Convenient imports for datakit.
//!
//! ```ignore
//! use datakit::prelude::*;
//!
//! let dataset = Dataset::open("./out")?;
//! let n = dataset.count(&QueryFilter::all().robots(["franka"]))?;
//! ```

// Main entry point
pub use crate::dataset::{Dataset, DatasetBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Episode model
pub use datakit_core::{DatasetSpec, Episode, EpisodeIndexRecord, Split, SplitRatios, Step, Tensor, Value};

// Compilation
pub use datakit_engine::{
    Adapter, CancelHandle, CompileResult, Compiler, Config, InMemoryAdapter, JsonlAdapter, PipelineSpec, Registry,
    Selector, StageSpec,
};

// Validation
pub use datakit_validate::{Severity, ValidationMode, ValidationReport};

// Index
pub use datakit_index::{DatasetCard, MixtureSpec, QueryFilter, SliceManifest, SliceMode};

// Durability
pub use datakit_durability::{RunManifest, RunStatus};
