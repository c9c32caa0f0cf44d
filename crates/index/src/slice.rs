//! Slice materialization.
//!
//! ## Design
//!
//! A slice is a new dataset root holding the index rows selected by a
//! [`QueryFilter`] from a parent dataset.
//!
//! | Mode | Shards | Paths in the new index |
//! |------|--------|------------------------|
//! | [`SliceMode::View`] | not copied | absolute paths of the parent files |
//! | [`SliceMode::Copy`] | copied under the slice root | unchanged, root-relative |
//!
//! Copied shards are whole files, so they can hold rows of episodes outside
//! the slice; the row ranges in the index stay valid either way. Both modes
//! write `meta/slice_manifest.json` recording where the slice came from.
//! Slicing a view slice in copy mode copies from the view's own parent.

use crate::error::{IndexError, Result};
use crate::query::{QueryEngine, QueryFilter};
use chrono::Utc;
use datakit_core::EpisodeIndexRecord;
use datakit_storage::layout::{INFO_FILE, TASKS_FILE};
use datakit_storage::{relative_path, write_index, ArtifactLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How shard files are referenced by a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceMode {
    /// Reference the parent's files
    #[default]
    View,
    /// Copy referenced files into the slice
    Copy,
}

impl SliceMode {
    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceMode::View => "view",
            SliceMode::Copy => "copy",
        }
    }
}

/// Provenance of a materialized slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceManifest {
    /// Caller-chosen slice id
    pub slice_id: String,
    /// Parent dataset root
    pub parent_dataset: String,
    /// Parent build id (empty when unknown)
    pub parent_build_id: String,
    /// Predicate used to select episodes
    pub query_filter: QueryFilter,
    /// Selected episode ids, in index order
    pub episode_ids: Vec<String>,
    /// View or copy
    pub mode: SliceMode,
    /// Creation time, RFC 3339
    pub created_at: String,
}

impl SliceManifest {
    /// Read a `slice_manifest.json`.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Builds slices of one parent dataset.
#[derive(Debug, Clone)]
pub struct SliceMaterializer {
    source: PathBuf,
    output: PathBuf,
    mode: SliceMode,
}

impl SliceMaterializer {
    /// Materializer from `source` into `output`.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>, mode: SliceMode) -> Self {
        SliceMaterializer {
            source: source.into(),
            output: output.into(),
            mode,
        }
    }

    /// Select episodes with `filter` and write the slice. When
    /// `parent_build_id` is `None` it is read from the parent's manifest.
    pub fn materialize(&self, filter: &QueryFilter, slice_id: &str, parent_build_id: Option<&str>) -> Result<SliceManifest> {
        if self.source == self.output {
            return Err(IndexError::InvalidSlice(
                "slice output must differ from the parent root".into(),
            ));
        }
        let engine = QueryEngine::open(&self.source)?;
        let selected = engine.query(filter)?;

        fs::create_dir_all(&self.output)?;
        let records = match self.mode {
            SliceMode::View => self.view_records(selected),
            SliceMode::Copy => self.copy_shards(selected)?,
        };

        let out = ArtifactLayout::new(&self.output);
        write_index(&out.index_path(), &records)?;

        let manifest = SliceManifest {
            slice_id: slice_id.to_string(),
            parent_dataset: self.source.to_string_lossy().into_owned(),
            parent_build_id: match parent_build_id {
                Some(id) => id.to_string(),
                None => self.parent_build_id(),
            },
            query_filter: filter.clone(),
            episode_ids: records.iter().map(|r| r.episode_id.clone()).collect(),
            mode: self.mode,
            created_at: Utc::now().to_rfc3339(),
        };
        fs::write(out.slice_manifest_path(), serde_json::to_string_pretty(&manifest)?)?;
        info!(
            slice_id,
            mode = self.mode.as_str(),
            episodes = records.len(),
            "Materialized slice"
        );
        Ok(manifest)
    }

    fn absolute(&self, path: &str) -> String {
        self.source.join(path).to_string_lossy().into_owned()
    }

    fn view_records(&self, mut records: Vec<EpisodeIndexRecord>) -> Vec<EpisodeIndexRecord> {
        for record in &mut records {
            record.parquet_file = self.absolute(&record.parquet_file);
            for locator in record.video_offsets.values_mut() {
                locator.video_file = self.absolute(&locator.video_file);
            }
        }
        records
    }

    /// Directory the source's shard paths are relative to. A view slice
    /// holds no shards of its own; its files live under its parent.
    fn files_root(&self) -> PathBuf {
        let manifest = ArtifactLayout::new(&self.source).slice_manifest_path();
        match SliceManifest::load(&manifest) {
            Ok(m) if m.mode == SliceMode::View => PathBuf::from(m.parent_dataset),
            _ => self.source.clone(),
        }
    }

    /// Root-relative form of a shard path; absolute paths must point
    /// inside `root`.
    fn relative(root: &Path, path: &str) -> Result<String> {
        let p = Path::new(path);
        if p.is_absolute() {
            relative_path(root, p).ok_or_else(|| {
                IndexError::InvalidSlice(format!("{path} is outside the parent root"))
            })
        } else {
            Ok(path.to_string())
        }
    }

    fn copy_shards(&self, mut records: Vec<EpisodeIndexRecord>) -> Result<Vec<EpisodeIndexRecord>> {
        let root = self.files_root();
        let mut files = BTreeSet::new();
        for record in &mut records {
            record.parquet_file = Self::relative(&root, &record.parquet_file)?;
            files.insert(record.parquet_file.clone());
            for locator in record.video_offsets.values_mut() {
                locator.video_file = Self::relative(&root, &locator.video_file)?;
                files.insert(locator.video_file.clone());
            }
        }
        for extra in [TASKS_FILE, INFO_FILE] {
            if root.join(extra).is_file() {
                files.insert(extra.to_string());
            }
        }
        for file in &files {
            let src = root.join(file);
            if !src.is_file() {
                warn!(file = %file, "Referenced file missing in parent; not copied");
                continue;
            }
            let dst = self.output.join(file);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
        }
        Ok(records)
    }

    fn parent_build_id(&self) -> String {
        let path = ArtifactLayout::new(&self.source).manifest_path();
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|v| v.get("build_id").and_then(|b| b.as_str()).map(String::from))
            .unwrap_or_default()
    }
}
