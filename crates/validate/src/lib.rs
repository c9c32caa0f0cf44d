//! Episode validation for datakit.
//!
//! Validators inspect one episode at a time and emit [`Finding`]s. The
//! [`ValidationRunner`] applies them in order, classifies the episode
//! (valid / invalid / rejected) and aggregates a [`ValidationReport`],
//! which [`ReportWriter`] persists next to the dataset.

#![warn(missing_docs)]

pub mod finding;
pub mod report;
pub mod runner;
pub mod validators;

pub use finding::{Finding, Severity};
pub use report::{ReportError, ReportSummary, ReportWriter, ValidationReport};
pub use runner::{RunnerOptions, ValidationMode, ValidationOutcome, ValidationRunner, Validator, Verdict};
pub use validators::*;
