//! Compilation engine for datakit.
//!
//! This crate wires the other workspace crates into a build:
//! - [`adapter`]: episode sources and the `"[start:end]"` selector
//! - [`config`]: serde configuration with defaults and per-dataset overrides
//! - [`registry`]: pipeline stages built by name from JSON parameters
//! - [`compiler`]: the transform -> validate -> write -> finalize loop
//!
//! # Example
//!
//! ```ignore
//! use datakit_engine::{Compiler, Config, JsonlAdapter};
//! use datakit_storage::LeRobotV3Writer;
//!
//! let config = Config::default();
//! let mut writer = LeRobotV3Writer::new(config.writer_options());
//! let mut compiler = Compiler::from_config(config)?;
//! let result = compiler.compile(&mut JsonlAdapter::new("./source"), &mut writer, "./out".as_ref())?;
//! println!("{} episodes in build {}", result.episodes_written, result.build_id());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod compiler;
pub mod config;
pub mod error;
pub mod registry;

pub use adapter::{Adapter, EpisodeStream, InMemoryAdapter, JsonlAdapter, Selector};
pub use compiler::{CancelHandle, CompileResult, Compiler, DEFAULT_PROGRESS_EVERY};
pub use config::{Config, ShardingConfig, TransformConfig, ValidationConfig};
pub use error::{AdapterError, AdapterResult, CompileError, Result};
pub use registry::{parse_params, PipelineSpec, Registry, StageSpec};
