//! Run manifest.
//!
//! ## Design
//!
//! A manifest is written with status `running` when a build starts and
//! overwritten exactly once when the build is sealed:
//!
//! | From | To | Via |
//! |------|----|-----|
//! | `running` | `completed` | [`RunManifest::seal_completed`] |
//! | `running` | `failed` | [`RunManifest::seal_failed`] |
//!
//! Any seal on a manifest that is not `running` returns
//! [`ManifestError::AlreadySealed`]. The status is the only state, so a
//! sealed manifest loaded from disk cannot be sealed again either.
//!
//! `build_id` is the first 12 hex characters of
//! `sha256("{config_hash}:{timestamp}")`.

use crate::error::{ManifestError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Build in progress
    Running,
    /// Build finished and verified
    Completed,
    /// Build aborted or failed verification
    Failed,
}

impl RunStatus {
    /// Check if the build is still running
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }

    /// Check if the build completed
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    /// Check if the build failed
    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build id derived from the config hash and start time.
pub fn build_id(config_hash: &str, timestamp: &str) -> String {
    let digest = Sha256::digest(format!("{config_hash}:{timestamp}").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

/// Reproducibility record of one compilation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Unique build id
    pub build_id: String,
    /// Start time, RFC 3339
    pub timestamp: String,
    /// Version of the compiler that produced the build
    pub datakit_version: String,
    /// Hash of `config`
    pub config_hash: String,
    /// Effective configuration
    pub config: serde_json::Value,
    /// Input source
    pub source_uri: String,
    /// Output root
    pub output_dir: String,
    /// Produced files, root-relative
    pub artifacts: Vec<String>,
    /// Episodes written
    pub episode_count: u64,
    /// Rows written
    pub total_frames: u64,
    /// Wall time of the run
    pub duration_secs: f64,
    /// Lifecycle state
    pub status: RunStatus,
    /// Failure cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunManifest {
    /// Running manifest stamped with the current time.
    pub fn create(
        config_hash: impl Into<String>,
        config: serde_json::Value,
        source_uri: impl Into<String>,
        output_dir: &Path,
    ) -> Self {
        let config_hash = config_hash.into();
        let timestamp = Utc::now().to_rfc3339();
        RunManifest {
            build_id: build_id(&config_hash, &timestamp),
            timestamp,
            datakit_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
            config,
            source_uri: source_uri.into(),
            output_dir: output_dir.to_string_lossy().into_owned(),
            artifacts: Vec::new(),
            episode_count: 0,
            total_frames: 0,
            duration_secs: 0.0,
            status: RunStatus::Running,
            error: None,
        }
    }

    fn ensure_running(&self) -> std::result::Result<(), ManifestError> {
        if self.status.is_running() {
            Ok(())
        } else {
            Err(ManifestError::AlreadySealed {
                build_id: self.build_id.clone(),
                status: self.status,
            })
        }
    }

    /// Seal as completed.
    pub fn seal_completed(
        &mut self,
        artifacts: Vec<String>,
        episode_count: u64,
        total_frames: u64,
        duration_secs: f64,
    ) -> std::result::Result<(), ManifestError> {
        self.ensure_running()?;
        self.artifacts = artifacts;
        self.episode_count = episode_count;
        self.total_frames = total_frames;
        self.duration_secs = duration_secs;
        self.status = RunStatus::Completed;
        Ok(())
    }

    /// Seal as failed with a cause.
    pub fn seal_failed(&mut self, error: impl Into<String>, duration_secs: f64) -> std::result::Result<(), ManifestError> {
        self.ensure_running()?;
        self.error = Some(error.into());
        self.duration_secs = duration_secs;
        self.status = RunStatus::Failed;
        Ok(())
    }

    /// Write as pretty JSON (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a manifest.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}
