//! Episode index rows.
//!
//! One [`EpisodeIndexRecord`] per written episode. It is the join between
//! the logical episode and its physical placement: a half-open row range in
//! one columnar shard and one frame range per camera in video shards.

use crate::split::Split;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where one camera's frames for an episode live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLocator {
    /// Video shard path, relative to the dataset root
    pub video_file: String,
    /// First frame of the episode within that file
    pub start_frame: u64,
    /// Number of frames
    pub num_frames: u64,
}

impl VideoLocator {
    /// One past the last frame
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.num_frames
    }
}

/// Index row for one written episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeIndexRecord {
    /// Source episode id
    pub episode_id: String,
    /// Dense position in write order; the `episode_index` column of data rows
    pub episode_index: u64,
    /// Dataset display name
    pub dataset_name: String,
    /// Robot identifier (`"unknown"` when the source has none)
    pub robot_id: String,
    /// Task catalog id
    pub task_id: Option<u32>,
    /// Task text
    pub task_text: Option<String>,
    /// Number of steps (and data rows)
    pub num_steps: u64,
    /// Last minus first timestamp
    pub duration_secs: f64,
    /// First step timestamp
    pub start_timestamp: f64,
    /// Last step timestamp
    pub end_timestamp: f64,
    /// Comma-joined sorted camera names
    pub camera_set: String,
    /// Action-space convention
    pub action_space_type: String,
    /// Flagged by validation
    pub invalid: bool,
    /// Source URI
    pub source_uri: String,
    /// Train / val / test
    pub split: Split,
    /// Columnar shard path, relative to the dataset root (absolute in view slices)
    pub parquet_file: String,
    /// First row of the episode within `parquet_file`
    pub parquet_row_start: u64,
    /// One past the last row
    pub parquet_row_end: u64,
    /// Camera name -> frame range
    pub video_offsets: BTreeMap<String, VideoLocator>,
    /// Output schema version
    pub schema_version: String,
}

impl EpisodeIndexRecord {
    /// Camera names parsed from `camera_set`.
    pub fn cameras(&self) -> Vec<&str> {
        self.camera_set
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Row count of the half-open range.
    pub fn num_rows(&self) -> u64 {
        self.parquet_row_end.saturating_sub(self.parquet_row_start)
    }
}

/// Comma-join sorted, de-duplicated camera names.
pub fn join_camera_set<S: AsRef<str>>(cameras: &[S]) -> String {
    let mut names: Vec<&str> = cameras.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_set_sorted() {
        assert_eq!(join_camera_set(&["wrist", "front", "wrist"]), "front,wrist");
        let empty: [&str; 0] = [];
        assert_eq!(join_camera_set(&empty), "");
    }
}
