//! `meta/info.json`.

use crate::error::Result;
use datakit_core::{keys, DatasetSpec, CODEBASE_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-feature entry of `info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    /// Element type
    pub dtype: String,
    /// Per-step shape
    pub shape: Vec<usize>,
    /// Stored in video shards instead of columns
    #[serde(default)]
    pub is_video: bool,
}

/// Dataset-level summary written at finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Layout version
    pub codebase_version: String,
    /// Robot type from the dataset spec
    pub robot_type: String,
    /// Frames per second
    pub fps: f64,
    /// Episodes written
    pub total_episodes: u64,
    /// Rows written
    pub total_frames: u64,
    /// Distinct tasks
    pub total_tasks: u64,
    /// Video shard files
    pub total_videos: u64,
    /// Chunk directories used
    pub total_chunks: u64,
    /// Episodes per chunk
    pub chunks_size: u64,
    /// Split name to episode indices
    pub splits: BTreeMap<String, Vec<u64>>,
    /// Columnar shard path template
    pub data_path: String,
    /// Video shard path template, absent when no camera was written
    pub video_path: Option<String>,
    /// Column name to feature
    pub features: BTreeMap<String, FeatureInfo>,
    /// Output schema version
    pub schema_version: String,
}

impl DatasetInfo {
    /// Skeleton from the spec; totals start at zero.
    pub fn from_spec(spec: &DatasetSpec, chunks_size: u64) -> Self {
        let mut features = BTreeMap::new();
        if let Some(action) = &spec.action_schema {
            features.insert(
                "action".to_string(),
                FeatureInfo {
                    dtype: action.dtype.clone(),
                    shape: action.shape.clone(),
                    is_video: false,
                },
            );
        }
        for (key, feature) in &spec.observation_schema {
            features.insert(
                keys::column_name(key),
                FeatureInfo {
                    dtype: feature.dtype.clone(),
                    shape: feature.shape.clone(),
                    is_video: feature.is_video,
                },
            );
        }
        DatasetInfo {
            codebase_version: CODEBASE_VERSION.to_string(),
            robot_type: spec.robot_type().to_string(),
            fps: spec.control_rate_hz,
            total_episodes: 0,
            total_frames: 0,
            total_tasks: 0,
            total_videos: 0,
            total_chunks: 0,
            chunks_size,
            splits: BTreeMap::new(),
            data_path: "data/chunk-{chunk:03d}/steps_{file:05d}.parquet".to_string(),
            video_path: None,
            features,
            schema_version: spec.schema_version.clone(),
        }
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read an `info.json`.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}
