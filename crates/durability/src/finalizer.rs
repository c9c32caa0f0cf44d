//! Build finalization: verify, checksum, seal.
//!
//! ## Design
//!
//! Runs once after the writer has finalized. Steps, in order:
//!
//! 1. Offset verification against the index table on disk:
//!    - index rows = episodes the compiler counted
//!    - Σ row ranges = total frames written
//!    - per columnar shard, sorted ranges are contiguous from 0 and end at
//!      the shard's physical row count (Parquet footer)
//!    - optionally, every row in a range carries the record's `episode_index`
//!    - per camera, Σ locator frames = frames handed to the encoder
//!    - per video file, frame ranges do not overlap
//! 2. SHA-256 of every produced file into `meta/checksums.json`.
//! 3. Seal the manifest as `completed`.
//!
//! Any violation in step 1 seals the manifest as `failed` with the
//! violation list and returns [`DurabilityError::Verification`].

use crate::checksum::{compute_checksums, write_checksums, Checksums};
use crate::error::{DurabilityError, Result};
use crate::manifest::RunManifest;
use datakit_core::EpisodeIndexRecord;
use datakit_storage::layout::CHECKSUMS_FILE;
use datakit_storage::{parquet_num_rows, read_episode_indices, read_index, ArtifactLayout, WriterSummary};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{info, warn};

/// Verification knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizerOptions {
    /// Read the `episode_index` column of every shard and check row ownership
    pub verify_row_ownership: bool,
}

impl Default for FinalizerOptions {
    fn default() -> Self {
        FinalizerOptions {
            verify_row_ownership: true,
        }
    }
}

/// What a successful finalize produced.
#[derive(Debug, Clone, Default)]
pub struct FinalizeOutcome {
    /// Recorded checksums
    pub checksums: Checksums,
    /// Artifact list stored in the manifest
    pub artifacts: Vec<String>,
}

/// Verifies and seals one dataset root.
#[derive(Debug, Clone)]
pub struct Finalizer {
    layout: ArtifactLayout,
    options: FinalizerOptions,
}

impl Finalizer {
    /// Finalizer for `root` with default options
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, FinalizerOptions::default())
    }

    /// Finalizer with explicit options
    pub fn with_options(root: impl Into<PathBuf>, options: FinalizerOptions) -> Self {
        Finalizer {
            layout: ArtifactLayout::new(root),
            options,
        }
    }

    /// Check the written index against the shards. Returns every
    /// violation found; empty means consistent.
    pub fn verify_offsets(&self, summary: &WriterSummary, episodes_counted: u64) -> Result<Vec<String>> {
        let records = read_index(&self.layout.index_path())?;
        let mut violations = Vec::new();

        if records.len() as u64 != episodes_counted {
            violations.push(format!(
                "index has {} rows, {} episodes were written",
                records.len(),
                episodes_counted
            ));
        }

        let rows: u64 = records.iter().map(EpisodeIndexRecord::num_rows).sum();
        if rows != summary.total_frames {
            violations.push(format!(
                "row ranges cover {rows} rows, {} frames were written",
                summary.total_frames
            ));
        }
        for r in &records {
            if r.num_rows() != r.num_steps {
                violations.push(format!(
                    "{}: row range [{}, {}) does not match {} steps",
                    r.episode_id, r.parquet_row_start, r.parquet_row_end, r.num_steps
                ));
            }
        }

        self.verify_shards(&records, &mut violations);
        verify_video(&records, summary, &mut violations);
        Ok(violations)
    }

    fn verify_shards(&self, records: &[EpisodeIndexRecord], violations: &mut Vec<String>) {
        let mut by_file: BTreeMap<&str, Vec<&EpisodeIndexRecord>> = BTreeMap::new();
        for r in records.iter().filter(|r| r.num_rows() > 0) {
            by_file.entry(r.parquet_file.as_str()).or_default().push(r);
        }

        for (file, mut ranges) in by_file {
            ranges.sort_by_key(|r| (r.parquet_row_start, r.parquet_row_end));
            let mut expected = 0u64;
            for r in &ranges {
                if r.parquet_row_start != expected {
                    violations.push(format!(
                        "{file}: {} starts at row {}, expected {expected}",
                        r.episode_id, r.parquet_row_start
                    ));
                }
                expected = expected.max(r.parquet_row_end);
            }

            let path = self.layout.resolve(file);
            match parquet_num_rows(&path) {
                Ok(physical) if physical != expected => violations.push(format!(
                    "{file}: ranges end at row {expected}, file holds {physical} rows"
                )),
                Ok(_) => {}
                Err(e) => {
                    violations.push(format!("{file}: unreadable: {e}"));
                    continue;
                }
            }

            if self.options.verify_row_ownership {
                match read_episode_indices(&path) {
                    Ok(owners) => {
                        for r in &ranges {
                            let start = r.parquet_row_start as usize;
                            let end = (r.parquet_row_end as usize).min(owners.len());
                            let foreign = owners
                                .get(start..end)
                                .map_or(0, |rows| rows.iter().filter(|&&e| e != r.episode_index).count());
                            if foreign > 0 {
                                violations.push(format!(
                                    "{file}: {foreign} rows in the range of {} belong to another episode",
                                    r.episode_id
                                ));
                            }
                        }
                    }
                    Err(e) => violations.push(format!("{file}: episode_index unreadable: {e}")),
                }
            }
        }
    }

    /// Verify, checksum and seal `manifest` as completed, saving it to
    /// `meta/manifest.json`. On verification failure the manifest is sealed
    /// as failed instead. If the sealed manifest cannot be saved, `manifest`
    /// stays `running`.
    pub fn finalize(
        &self,
        manifest: &mut RunManifest,
        summary: &WriterSummary,
        episodes_counted: u64,
        duration_secs: f64,
    ) -> Result<FinalizeOutcome> {
        let violations = self.verify_offsets(summary, episodes_counted)?;
        if !violations.is_empty() {
            for v in &violations {
                warn!(violation = %v, "Offset verification");
            }
            let cause = DurabilityError::Verification(violations.clone()).to_string();
            self.fail(manifest, &cause, duration_secs)?;
            return Err(DurabilityError::Verification(violations));
        }

        let root = self.layout.root();
        let checksums = compute_checksums(root, &summary.artifacts)?;
        write_checksums(root, &checksums)?;

        let mut artifacts: BTreeSet<String> = summary.artifacts.iter().cloned().collect();
        artifacts.insert(CHECKSUMS_FILE.to_string());
        let artifacts: Vec<String> = artifacts.into_iter().collect();

        let mut sealed = manifest.clone();
        sealed.seal_completed(
            artifacts.clone(),
            summary.total_episodes(),
            summary.total_frames,
            duration_secs,
        )?;
        sealed.save(&self.layout.manifest_path())?;
        *manifest = sealed;
        info!(
            build_id = %manifest.build_id,
            files = checksums.len(),
            "Build sealed"
        );
        Ok(FinalizeOutcome { checksums, artifacts })
    }

    /// Seal `manifest` as failed and save it.
    ///
    /// `manifest` only changes once the sealed copy is on disk, so a failed
    /// save leaves it `running` and the caller can seal it again.
    pub fn fail(&self, manifest: &mut RunManifest, cause: &str, duration_secs: f64) -> Result<()> {
        let mut sealed = manifest.clone();
        sealed.seal_failed(cause, duration_secs)?;
        sealed.save(&self.layout.manifest_path())?;
        *manifest = sealed;
        warn!(build_id = %manifest.build_id, cause, "Build failed");
        Ok(())
    }
}

fn verify_video(records: &[EpisodeIndexRecord], summary: &WriterSummary, violations: &mut Vec<String>) {
    let mut per_camera: BTreeMap<&str, u64> = BTreeMap::new();
    let mut per_file: BTreeMap<&str, Vec<(u64, u64, &str)>> = BTreeMap::new();
    for r in records {
        for (camera, loc) in &r.video_offsets {
            *per_camera.entry(camera.as_str()).or_default() += loc.num_frames;
            per_file
                .entry(loc.video_file.as_str())
                .or_default()
                .push((loc.start_frame, loc.end_frame(), r.episode_id.as_str()));
        }
    }

    let cameras: BTreeSet<&str> = per_camera
        .keys()
        .copied()
        .chain(summary.video_frames.keys().map(String::as_str))
        .collect();
    for camera in cameras {
        let located = per_camera.get(camera).copied().unwrap_or(0);
        let written = summary.video_frames.get(camera).copied().unwrap_or(0);
        if located != written {
            violations.push(format!(
                "camera {camera}: locators cover {located} frames, {written} were encoded"
            ));
        }
    }

    for (file, mut ranges) in per_file {
        ranges.sort();
        for pair in ranges.windows(2) {
            let (_, prev_end, prev_id) = pair[0];
            let (start, _, id) = pair[1];
            if start < prev_end {
                violations.push(format!("{file}: frames of {id} overlap {prev_id}"));
            }
        }
    }
}
