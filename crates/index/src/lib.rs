//! Episode index queries, slices and mixtures.
//!
//! The index table written by the storage layer is the only input: a
//! [`QueryEngine`] loads it and filters records in memory, a
//! [`SliceMaterializer`] turns a query result into a new dataset root, and
//! a [`DatasetCard`] summarizes a root as a markdown README.
//! Split assignment is re-exported from `datakit-core` because it is a
//! property of the episode id alone.

#![warn(missing_docs)]

pub mod card;
pub mod error;
pub mod mixture;
pub mod query;
pub mod slice;

pub use datakit_core::{split_bucket, split_for, Split, SplitRatios};
pub use card::{DatasetCard, CARD_FILE, MAX_CARD_TASKS};
pub use error::{IndexError, Result};
pub use mixture::{DatasetWeight, MixtureSpec};
pub use query::{CompiledFilter, QueryEngine, QueryFilter};
pub use slice::{SliceManifest, SliceMaterializer, SliceMode};
