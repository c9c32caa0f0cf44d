//! Validation runner.
//!
//! Runs an ordered list of [`Validator`]s over each episode, applies
//! severity overrides, classifies the episode and folds the result into a
//! running [`ValidationReport`].
//!
//! # Execution modes
//!
//! | Mode | WARN-only episode | ERROR episode | Stops the run |
//! |------|-------------------|---------------|---------------|
//! | `Collect` | invalid | rejected | never |
//! | `Quarantine` | invalid + quarantined | rejected + quarantined | never |
//! | `FailFast` | invalid (rejected with `fail_on_warn`) | rejected | on ERROR (or WARN with `fail_on_warn`) |
//!
//! In `FailFast`, validators after the first failing one are skipped.

use crate::finding::{Finding, Severity};
use crate::report::ValidationReport;
use datakit_core::{DatasetSpec, Episode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// An episode check.
///
/// Implementations are side-effect free and independent of each other:
/// the same episode and spec always produce the same findings. Problems in
/// the episode are reported as findings, never as errors.
pub trait Validator: Send + Sync {
    /// Registry name, stamped on every finding
    fn name(&self) -> &str;

    /// Inspect `episode` against `spec`.
    fn validate(&self, episode: &Episode, spec: &DatasetSpec) -> Vec<Finding>;
}

/// How the runner reacts to findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Record everything, never stop
    #[default]
    Collect,
    /// Record everything, flag failing episodes as quarantined
    Quarantine,
    /// Stop the run at the first failing episode
    FailFast,
}

impl ValidationMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Collect => "collect",
            ValidationMode::Quarantine => "quarantine",
            ValidationMode::FailFast => "fail_fast",
        }
    }
}

/// Runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// Execution mode
    pub mode: ValidationMode,
    /// In `FailFast`, treat WARN like ERROR
    pub fail_on_warn: bool,
    /// Rule code -> replacement severity
    pub severity_overrides: BTreeMap<String, Severity>,
}

impl RunnerOptions {
    /// Collect everything
    pub fn collect() -> Self {
        Self::default()
    }

    /// Quarantine failing episodes
    pub fn quarantine() -> Self {
        RunnerOptions {
            mode: ValidationMode::Quarantine,
            ..Default::default()
        }
    }

    /// Stop at the first ERROR
    pub fn fail_fast() -> Self {
        RunnerOptions {
            mode: ValidationMode::FailFast,
            ..Default::default()
        }
    }

    /// Stop at the first ERROR or WARN
    pub fn strict() -> Self {
        RunnerOptions {
            mode: ValidationMode::FailFast,
            fail_on_warn: true,
            ..Default::default()
        }
    }

    /// Override the severity of one rule code
    pub fn with_override(mut self, code: impl Into<String>, severity: Severity) -> Self {
        self.severity_overrides.insert(code.into(), severity);
        self
    }
}

/// Classification of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No ERROR or WARN
    Valid,
    /// WARN but no ERROR: written, marked invalid
    Invalid,
    /// ERROR: never written
    Rejected,
}

impl Verdict {
    /// Episode should reach the writer
    pub fn is_written(&self) -> bool {
        !matches!(self, Verdict::Rejected)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "valid",
            Verdict::Invalid => "invalid",
            Verdict::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of validating one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Findings after severity overrides
    pub findings: Vec<Finding>,
    /// Classification
    pub verdict: Verdict,
    /// Quarantine mode flagged this episode
    pub quarantined: bool,
    /// Fail-fast triggered: the caller must stop consuming episodes
    pub abort: bool,
}

/// Runs validators and keeps the run's report.
pub struct ValidationRunner {
    validators: Vec<Box<dyn Validator>>,
    options: RunnerOptions,
    report: ValidationReport,
}

impl ValidationRunner {
    /// Runner with no validators.
    pub fn new(options: RunnerOptions) -> Self {
        ValidationRunner {
            validators: Vec::new(),
            options,
            report: ValidationReport::new(),
        }
    }

    /// Append a validator; validators run in insertion order.
    pub fn add(&mut self, validator: Box<dyn Validator>) -> &mut Self {
        self.validators.push(validator);
        self
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Registered validator names, in order
    pub fn names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Runner options
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Report accumulated so far
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Take the report, leaving an empty one
    pub fn take_report(&mut self) -> ValidationReport {
        std::mem::take(&mut self.report)
    }

    fn fails(&self, findings: &[Finding]) -> bool {
        findings.iter().any(|f| {
            f.severity.is_error() || (self.options.fail_on_warn && f.severity.is_warn())
        })
    }

    /// Validate one episode and record it in the report.
    pub fn validate(&mut self, episode: &Episode, spec: &DatasetSpec) -> ValidationOutcome {
        let fail_fast = self.options.mode == ValidationMode::FailFast;
        let mut findings = Vec::new();

        for validator in &self.validators {
            let mut emitted = validator.validate(episode, spec);
            for f in &mut emitted {
                f.validator = validator.name().to_string();
                f.episode_id = Some(episode.episode_id.clone());
                if let Some(severity) = self.options.severity_overrides.get(&f.code) {
                    f.severity = *severity;
                }
            }
            let stop = fail_fast && self.fails(&emitted);
            findings.extend(emitted);
            if stop {
                break;
            }
        }

        let has_error = findings.iter().any(|f| f.severity.is_error());
        let has_warn = findings.iter().any(|f| f.severity.is_warn());
        let abort = fail_fast && self.fails(&findings);

        let verdict = if has_error || (abort && has_warn) {
            Verdict::Rejected
        } else if has_warn {
            Verdict::Invalid
        } else {
            Verdict::Valid
        };
        let quarantined =
            self.options.mode == ValidationMode::Quarantine && (has_error || has_warn);

        debug!(
            episode_id = %episode.episode_id,
            verdict = %verdict,
            findings = findings.len(),
            "Validated episode"
        );
        self.report.add_episode(verdict, &findings);
        if quarantined {
            self.report.quarantine(episode.episode_id.as_str());
        }

        ValidationOutcome {
            findings,
            verdict,
            quarantined,
            abort,
        }
    }
}

impl std::fmt::Debug for ValidationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRunner")
            .field("validators", &self.names())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_core::Step;

    struct Fixed {
        name: &'static str,
        findings: Vec<Finding>,
    }

    impl Validator for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn validate(&self, _: &Episode, _: &DatasetSpec) -> Vec<Finding> {
            self.findings.clone()
        }
    }

    fn fixed(name: &'static str, findings: Vec<Finding>) -> Fixed {
        Fixed { name, findings }
    }

    fn episode() -> Episode {
        Episode::new("ep_1", "ds", vec![Step::default().with_flags(true, true, true)])
    }

    #[test]
    fn test_collect_classifies() {
        let spec = DatasetSpec::new("ds", "ds");
        let mut runner = ValidationRunner::new(RunnerOptions::collect())
            .with(fixed("warns", vec![Finding::warn("W1", "w")]));
        let outcome = runner.validate(&episode(), &spec);
        assert_eq!(outcome.verdict, Verdict::Invalid);
        assert!(!outcome.abort);
        assert!(!outcome.quarantined);
        assert_eq!(outcome.findings[0].validator, "warns");
        assert_eq!(outcome.findings[0].episode_id.as_deref(), Some("ep_1"));
    }

    #[test]
    fn test_fail_fast_skips_later_validators() {
        let spec = DatasetSpec::new("ds", "ds");
        let mut runner = ValidationRunner::new(RunnerOptions::fail_fast())
            .with(fixed("errors", vec![Finding::error("E1", "e")]))
            .with(fixed("never", vec![Finding::warn("W1", "w")]));
        let outcome = runner.validate(&episode(), &spec);
        assert_eq!(outcome.verdict, Verdict::Rejected);
        assert!(outcome.abort);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(runner.report().error_episodes, 1);
    }

    #[test]
    fn test_fail_on_warn_rejects() {
        let spec = DatasetSpec::new("ds", "ds");
        let mut runner = ValidationRunner::new(RunnerOptions::strict())
            .with(fixed("warns", vec![Finding::warn("W1", "w")]));
        let outcome = runner.validate(&episode(), &spec);
        assert!(outcome.abort);
        assert_eq!(outcome.verdict, Verdict::Rejected);
    }

    #[test]
    fn test_quarantine_flags_warn_episodes() {
        let spec = DatasetSpec::new("ds", "ds");
        let mut runner = ValidationRunner::new(RunnerOptions::quarantine())
            .with(fixed("warns", vec![Finding::warn("W1", "w")]));
        let outcome = runner.validate(&episode(), &spec);
        assert!(outcome.quarantined);
        assert_eq!(outcome.verdict, Verdict::Invalid);
        assert!(!outcome.abort);
        assert_eq!(runner.report().quarantined, vec!["ep_1".to_string()]);
    }

    #[test]
    fn test_collect_records_no_quarantine() {
        let spec = DatasetSpec::new("ds", "ds");
        let mut runner = ValidationRunner::new(RunnerOptions::collect())
            .with(fixed("errors", vec![Finding::error("E1", "e")]));
        runner.validate(&episode(), &spec);
        assert!(runner.report().quarantined.is_empty());
    }

    #[test]
    fn test_severity_override_downgrades_error() {
        let spec = DatasetSpec::new("ds", "ds");
        let options = RunnerOptions::fail_fast().with_override("E1", Severity::Info);
        let mut runner =
            ValidationRunner::new(options).with(fixed("errors", vec![Finding::error("E1", "e")]));
        let outcome = runner.validate(&episode(), &spec);
        assert_eq!(outcome.verdict, Verdict::Valid);
        assert!(!outcome.abort);
        assert_eq!(outcome.findings[0].severity, Severity::Info);
    }
}
