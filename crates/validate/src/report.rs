//! Aggregated validation report and its on-disk form.

use crate::finding::{Finding, Severity};
use crate::runner::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Summary file name under the reports directory
pub const SUMMARY_FILE: &str = "validation_summary.json";
/// Findings file name under the reports directory
pub const FINDINGS_FILE: &str = "findings.jsonl";

/// Per-run aggregate of every validated episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Episodes validated
    pub total_episodes: u64,
    /// Episodes with no ERROR or WARN
    pub valid_episodes: u64,
    /// Episodes with WARN but no ERROR (written, marked invalid)
    pub invalid_episodes: u64,
    /// Episodes with ERROR (rejected)
    pub error_episodes: u64,
    /// Episodes flagged in quarantine mode, in validation order
    #[serde(default)]
    pub quarantined: Vec<String>,
    /// Every finding, in emission order
    pub findings: Vec<Finding>,
}

/// Counts written to `validation_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Episodes validated
    pub total_episodes: u64,
    /// Clean episodes
    pub valid_episodes: u64,
    /// WARN-only episodes
    pub invalid_episodes: u64,
    /// Rejected episodes
    pub error_episodes: u64,
    /// ERROR findings
    pub error_count: usize,
    /// WARN findings
    pub warn_count: usize,
    /// INFO findings
    pub info_count: usize,
    /// Severity -> code -> count
    pub by_severity: BTreeMap<Severity, BTreeMap<String, usize>>,
    /// Quarantined episode ids
    pub quarantined_episodes: Vec<String>,
}

impl ValidationReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one episode's outcome into the report.
    pub fn add_episode(&mut self, verdict: Verdict, findings: &[Finding]) {
        self.total_episodes += 1;
        match verdict {
            Verdict::Rejected => self.error_episodes += 1,
            Verdict::Invalid => self.invalid_episodes += 1,
            Verdict::Valid => self.valid_episodes += 1,
        }
        self.findings.extend_from_slice(findings);
    }

    /// Record `episode_id` as quarantined.
    pub fn quarantine(&mut self, episode_id: impl Into<String>) {
        self.quarantined.push(episode_id.into());
    }

    /// Check if `episode_id` was quarantined
    pub fn is_quarantined(&self, episode_id: &str) -> bool {
        self.quarantined.iter().any(|id| id == episode_id)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// ERROR findings
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// WARN findings
    pub fn warn_count(&self) -> usize {
        self.count(Severity::Warn)
    }

    /// INFO findings
    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    /// Any ERROR finding recorded
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_error())
    }

    /// Any WARN finding recorded
    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_warn())
    }

    /// Code -> finding count.
    pub fn by_code(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.findings {
            *counts.entry(f.code.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Findings for one episode.
    pub fn findings_for<'a>(&'a self, episode_id: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings
            .iter()
            .filter(move |f| f.episode_id.as_deref() == Some(episode_id))
    }

    /// Counts for `validation_summary.json`.
    pub fn summary(&self) -> ReportSummary {
        let mut by_severity: BTreeMap<Severity, BTreeMap<String, usize>> = BTreeMap::new();
        for severity in [Severity::Error, Severity::Warn, Severity::Info] {
            by_severity.insert(severity, BTreeMap::new());
        }
        for f in &self.findings {
            *by_severity
                .entry(f.severity)
                .or_default()
                .entry(f.code.clone())
                .or_insert(0) += 1;
        }
        ReportSummary {
            total_episodes: self.total_episodes,
            valid_episodes: self.valid_episodes,
            invalid_episodes: self.invalid_episodes,
            error_episodes: self.error_episodes,
            error_count: self.error_count(),
            warn_count: self.warn_count(),
            info_count: self.info_count(),
            by_severity,
            quarantined_episodes: self.quarantined.clone(),
        }
    }

    /// One-line summary for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{} episodes: {} valid, {} invalid, {} rejected ({} errors, {} warnings)",
            self.total_episodes,
            self.valid_episodes,
            self.invalid_episodes,
            self.error_episodes,
            self.error_count(),
            self.warn_count()
        )
    }
}

/// Report writing failure.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Filesystem failure
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure
    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes `validation_summary.json` and `findings.jsonl`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Writer targeting `dir` (created on write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReportWriter { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write both files; returns their paths.
    pub fn write(&self, report: &ValidationReport) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(&self.dir)?;

        let summary_path = self.dir.join(SUMMARY_FILE);
        fs::write(&summary_path, serde_json::to_vec_pretty(&report.summary())?)?;

        let findings_path = self.dir.join(FINDINGS_FILE);
        let mut out = BufWriter::new(fs::File::create(&findings_path)?);
        for finding in &report.findings {
            serde_json::to_writer(&mut out, finding)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        Ok(vec![summary_path, findings_path])
    }
}
