//! Compilation Integration Tests
//!
//! End-to-end builds of synthetic sources through the default pipeline:
//! transforms, validation, sharded writing and finalization.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test compile
//! cargo test --test compile gating::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod errors;
mod gating;
mod scenario;
