//! On-disk layout of a compiled dataset.
//!
//! ```text
//! <root>/
//!   meta/info.json
//!   meta/tasks.jsonl
//!   meta/stats.json
//!   meta/episodes/episodes.parquet
//!   meta/checksums.json
//!   meta/manifest.json
//!   meta/slice_manifest.json        (slices only)
//!   data/chunk-000/steps_00000.parquet
//!   videos/chunk-000/<camera>_000.mp4
//!   reports/validation_summary.json
//!   reports/findings.jsonl
//! ```
//!
//! Shard paths stored in the index are relative to `<root>` with `/`
//! separators.

use std::path::{Path, PathBuf};

/// Metadata directory
pub const META_DIR: &str = "meta";
/// Columnar shard directory
pub const DATA_DIR: &str = "data";
/// Video shard directory
pub const VIDEOS_DIR: &str = "videos";
/// Validation report directory
pub const REPORTS_DIR: &str = "reports";

/// Dataset info file
pub const INFO_FILE: &str = "meta/info.json";
/// Task catalog file
pub const TASKS_FILE: &str = "meta/tasks.jsonl";
/// Feature statistics file
pub const STATS_FILE: &str = "meta/stats.json";
/// Episode index table
pub const INDEX_FILE: &str = "meta/episodes/episodes.parquet";
/// Older flat index location, still read
pub const LEGACY_INDEX_FILE: &str = "meta/episodes.parquet";
/// Checksum map
pub const CHECKSUMS_FILE: &str = "meta/checksums.json";
/// Run manifest
pub const MANIFEST_FILE: &str = "meta/manifest.json";
/// Slice provenance
pub const SLICE_MANIFEST_FILE: &str = "meta/slice_manifest.json";

/// Path helper rooted at a dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    /// Layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactLayout { root: root.into() }
    }

    /// Dataset root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute form of a root-relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// `meta/info.json`
    pub fn info_path(&self) -> PathBuf {
        self.resolve(INFO_FILE)
    }

    /// `meta/tasks.jsonl`
    pub fn tasks_path(&self) -> PathBuf {
        self.resolve(TASKS_FILE)
    }

    /// `meta/stats.json`
    pub fn stats_path(&self) -> PathBuf {
        self.resolve(STATS_FILE)
    }

    /// `meta/episodes/episodes.parquet`
    pub fn index_path(&self) -> PathBuf {
        self.resolve(INDEX_FILE)
    }

    /// `meta/checksums.json`
    pub fn checksums_path(&self) -> PathBuf {
        self.resolve(CHECKSUMS_FILE)
    }

    /// `meta/manifest.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(MANIFEST_FILE)
    }

    /// `meta/slice_manifest.json`
    pub fn slice_manifest_path(&self) -> PathBuf {
        self.resolve(SLICE_MANIFEST_FILE)
    }

    /// `reports/`
    pub fn reports_dir(&self) -> PathBuf {
        self.resolve(REPORTS_DIR)
    }

    /// Existing index table: the current location first, then the legacy one.
    pub fn find_index(&self) -> Option<PathBuf> {
        [INDEX_FILE, LEGACY_INDEX_FILE]
            .iter()
            .map(|rel| self.resolve(rel))
            .find(|p| p.is_file())
    }

    /// `data/chunk-{chunk:03}/steps_{shard:05}.parquet`
    pub fn data_shard(chunk: usize, shard: usize) -> String {
        format!("{}/chunk-{:03}/steps_{:05}.parquet", DATA_DIR, chunk, shard)
    }

    /// `videos/chunk-{chunk:03}/{camera}_{shard:03}.{ext}`
    pub fn video_shard(chunk: usize, camera: &str, shard: usize, ext: &str) -> String {
        format!("{}/chunk-{:03}/{}_{:03}.{}", VIDEOS_DIR, chunk, camera, shard, ext)
    }
}

/// Root-relative path with `/` separators, or `None` if `path` is outside `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
