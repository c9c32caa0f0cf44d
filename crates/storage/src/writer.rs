//! Episode writers.
//!
//! ## Design
//!
//! [`LeRobotV3Writer`] turns a stream of accepted episodes into the
//! LeRobot v3 layout. Steps are buffered as rows and flushed to a columnar
//! shard once the buffer reaches `rows_per_shard`; the check happens after a
//! whole episode has been buffered, so an episode never spans two shards.
//! Image features go to the per-camera video side channel instead.
//!
//! Every `episodes_per_chunk` episodes the row buffer is flushed and the
//! writer moves to the next `chunk-NNN` directory.
//!
//! Each written episode yields one [`EpisodeIndexRecord`] with its half-open
//! row range inside its shard and one [`datakit_core::VideoLocator`] per
//! camera. Records are kept in memory and written as the index table on
//! [`EpisodeWriter::finalize`], together with `info.json`, `tasks.jsonl` and
//! `stats.json`.

use crate::error::{Result, StorageError};
use crate::index_table::write_index;
use crate::info::DatasetInfo;
use crate::layout::{ArtifactLayout, INDEX_FILE, INFO_FILE, STATS_FILE, TASKS_FILE};
use crate::parquet_io::write_batches;
use crate::step_codec::{StepCodec, StepRow};
use crate::video::{EncoderFactory, FfmpegEncoderFactory, RgbFrame, VideoShardWriter};
use datakit_core::{
    join_camera_set, keys, split_for, DatasetSpec, Episode, EpisodeIndexRecord, SplitRatios,
    StatsAccumulator, TaskCatalog,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Output of a finished writer.
#[derive(Debug, Clone, Default)]
pub struct WriterSummary {
    /// Dataset root
    pub root: PathBuf,
    /// Every produced file, root-relative
    pub artifacts: Vec<String>,
    /// Columnar shards, root-relative
    pub data_files: Vec<String>,
    /// Video shards, root-relative
    pub video_files: Vec<String>,
    /// One record per written episode, in write order
    pub records: Vec<EpisodeIndexRecord>,
    /// Rows across all shards
    pub total_frames: u64,
    /// Frames handed to the encoder, per camera
    pub video_frames: BTreeMap<String, u64>,
    /// Distinct tasks in `tasks.jsonl`
    pub total_tasks: u64,
}

impl WriterSummary {
    /// Episodes written
    pub fn total_episodes(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Sink for accepted episodes.
pub trait EpisodeWriter: Send {
    /// Prepare to write into `root`.
    fn begin(&mut self, spec: &DatasetSpec, root: &Path) -> Result<()>;

    /// Write one episode; returns its index record.
    fn write_episode(&mut self, episode: &Episode) -> Result<EpisodeIndexRecord>;

    /// Flush everything and write dataset metadata.
    fn finalize(&mut self) -> Result<WriterSummary>;
}

/// Sharding and split parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Episodes per chunk directory
    pub episodes_per_chunk: usize,
    /// Row buffer size that triggers a shard flush
    pub rows_per_shard: usize,
    /// Frame budget of one video shard
    pub max_video_frames_per_shard: u64,
    /// Split hash seed
    pub split_seed: u64,
    /// Split ratios
    pub split_ratios: SplitRatios,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            episodes_per_chunk: 1000,
            rows_per_shard: 10_000,
            max_video_frames_per_shard: 10_000,
            split_seed: 42,
            split_ratios: SplitRatios::default(),
        }
    }
}

struct WriterState {
    layout: ArtifactLayout,
    spec: DatasetSpec,
    codec: Option<StepCodec>,
    rows: Vec<StepRow>,
    chunk: usize,
    shard: usize,
    episodes_in_chunk: usize,
    total_frames: u64,
    records: Vec<EpisodeIndexRecord>,
    catalog: TaskCatalog,
    stats: StatsAccumulator,
    video: VideoShardWriter,
    data_files: Vec<String>,
}

/// LeRobot v3 layout writer.
pub struct LeRobotV3Writer {
    options: WriterOptions,
    encoder: Arc<dyn EncoderFactory>,
    state: Option<WriterState>,
    finalized: bool,
}

impl LeRobotV3Writer {
    /// Writer encoding video with `ffmpeg`.
    pub fn new(options: WriterOptions) -> Self {
        Self::with_encoder(options, Arc::new(FfmpegEncoderFactory::default()))
    }

    /// Writer with a custom video encoder.
    pub fn with_encoder(options: WriterOptions, encoder: Arc<dyn EncoderFactory>) -> Self {
        LeRobotV3Writer {
            options,
            encoder,
            state: None,
            finalized: false,
        }
    }

    /// Sharding options
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Episodes written so far
    pub fn episode_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.records.len())
    }

    fn state_mut(&mut self) -> Result<&mut WriterState> {
        if self.finalized {
            return Err(StorageError::InvalidState("writer already finalized".into()));
        }
        self.state
            .as_mut()
            .ok_or_else(|| StorageError::InvalidState("begin() was not called".into()))
    }
}

impl WriterState {
    fn flush(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let codec = self
            .codec
            .as_ref()
            .ok_or_else(|| StorageError::InvalidState("rows buffered without a schema".into()))?;
        let file = ArtifactLayout::data_shard(self.chunk, self.shard);
        let batch = codec.encode(&self.rows)?;
        write_batches(&self.layout.resolve(&file), codec.schema(), &[batch])?;
        debug!(file = %file, rows = self.rows.len(), "Flushed shard");
        self.data_files.push(file);
        self.shard += 1;
        self.rows.clear();
        Ok(())
    }

    fn video_locators(&mut self, episode: &Episode) -> Result<BTreeMap<String, datakit_core::VideoLocator>> {
        let mut locators = BTreeMap::new();
        let video_keys: Vec<String> = self.spec.video_features().map(|(k, _)| k.clone()).collect();
        for key in video_keys {
            let camera = keys::camera_name(&key).unwrap_or(&key).to_string();
            let frames: Vec<RgbFrame> = episode
                .steps
                .iter()
                .filter_map(|s| s.observation.get(&key))
                .filter_map(|v| v.as_tensor())
                .filter_map(RgbFrame::from_tensor)
                .collect();
            if let Some(locator) = self.video.write_episode(self.chunk, &camera, &frames)? {
                locators.insert(camera, locator);
            }
        }
        Ok(locators)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

impl EpisodeWriter for LeRobotV3Writer {
    fn begin(&mut self, spec: &DatasetSpec, root: &Path) -> Result<()> {
        if self.state.is_some() || self.finalized {
            return Err(StorageError::InvalidState("begin() called twice".into()));
        }
        let layout = ArtifactLayout::new(root);
        fs::create_dir_all(layout.resolve(crate::layout::META_DIR))?;
        let video = VideoShardWriter::new(
            root,
            self.encoder.clone(),
            spec.control_rate_hz,
            self.options.max_video_frames_per_shard,
        );
        info!(root = %root.display(), dataset = %spec.dataset_name, "Writer started");
        self.state = Some(WriterState {
            layout,
            spec: spec.clone(),
            codec: None,
            rows: Vec::new(),
            chunk: 0,
            shard: 0,
            episodes_in_chunk: 0,
            total_frames: 0,
            records: Vec::new(),
            catalog: TaskCatalog::new(),
            stats: StatsAccumulator::new(),
            video,
            data_files: Vec::new(),
        });
        Ok(())
    }

    fn write_episode(&mut self, episode: &Episode) -> Result<EpisodeIndexRecord> {
        let options = self.options.clone();
        let state = self.state_mut()?;

        if state.episodes_in_chunk >= options.episodes_per_chunk.max(1) {
            state.flush()?;
            state.chunk += 1;
            state.episodes_in_chunk = 0;
        }

        if state.codec.is_none() {
            if state.spec.observation_schema.is_empty() {
                state.spec.infer_schema(episode);
            } else if state.spec.action_schema.is_none() {
                if let Some(action) = episode.actions().next() {
                    state.spec.action_schema =
                        Some(datakit_core::FeatureSpec::new("float32", vec![action.len()]));
                }
            }
            state.codec = Some(StepCodec::new(&state.spec));
        }
        let codec = state
            .codec
            .as_ref()
            .ok_or_else(|| StorageError::InvalidState("schema not initialized".into()))?;

        let episode_index = state.records.len() as u64;
        let task_id = episode
            .task_text
            .as_deref()
            .map(|text| state.catalog.get_or_add(text));

        let row_start = state.rows.len() as u64;
        let rows = codec.rows(episode, episode_index, state.total_frames, task_id);
        state.rows.extend(rows);
        let row_end = state.rows.len() as u64;
        let parquet_file = ArtifactLayout::data_shard(state.chunk, state.shard);

        let video_offsets = state.video_locators(episode)?;
        state.stats.add_episode(episode);

        let record = EpisodeIndexRecord {
            episode_id: episode.episode_id.clone(),
            episode_index,
            dataset_name: state.spec.dataset_name.clone(),
            robot_id: episode.robot_id(),
            task_id,
            task_text: episode.task_text.clone(),
            num_steps: episode.num_steps() as u64,
            duration_secs: episode.duration(),
            start_timestamp: episode.start_timestamp().unwrap_or(0.0),
            end_timestamp: episode.end_timestamp().unwrap_or(0.0),
            camera_set: join_camera_set(&episode.camera_names()),
            action_space_type: state.spec.action_space_type.as_str().to_string(),
            invalid: episode.invalid,
            source_uri: state.spec.source_uri.clone(),
            split: split_for(&episode.episode_id, options.split_seed, options.split_ratios),
            parquet_file,
            parquet_row_start: row_start,
            parquet_row_end: row_end,
            video_offsets,
            schema_version: state.spec.schema_version.clone(),
        };
        state.records.push(record.clone());
        state.total_frames += episode.num_steps() as u64;
        state.episodes_in_chunk += 1;

        if state.rows.len() >= options.rows_per_shard.max(1) {
            state.flush()?;
        }
        Ok(record)
    }

    fn finalize(&mut self) -> Result<WriterSummary> {
        if self.finalized {
            return Err(StorageError::InvalidState("writer already finalized".into()));
        }
        let chunks_size = self.options.episodes_per_chunk as u64;
        let mut state = self
            .state
            .take()
            .ok_or_else(|| StorageError::InvalidState("begin() was not called".into()))?;
        self.finalized = true;

        state.flush()?;
        let video_frames = state.video.finish()?;
        let video_files = state.video.files().to_vec();

        let mut info = DatasetInfo::from_spec(&state.spec, chunks_size);
        info.total_episodes = state.records.len() as u64;
        info.total_frames = state.total_frames;
        info.total_tasks = state.catalog.len() as u64;
        info.total_videos = video_files.len() as u64;
        info.total_chunks = if state.records.is_empty() { 0 } else { state.chunk as u64 + 1 };
        for record in &state.records {
            info.splits
                .entry(record.split.as_str().to_string())
                .or_default()
                .push(record.episode_index);
        }
        if !video_files.is_empty() {
            info.video_path = Some(format!(
                "videos/chunk-{{chunk:03d}}/{{camera}}_{{file:03d}}.{}",
                self.encoder.extension()
            ));
        }
        info.save(&state.layout.info_path())?;
        write_text(&state.layout.tasks_path(), &state.catalog.to_jsonl()?)?;
        write_text(
            &state.layout.stats_path(),
            &serde_json::to_string_pretty(&state.stats.compute())?,
        )?;
        write_index(&state.layout.index_path(), &state.records)?;

        let mut artifacts = state.data_files.clone();
        artifacts.extend(video_files.iter().cloned());
        artifacts.extend([INFO_FILE, TASKS_FILE, STATS_FILE, INDEX_FILE].map(String::from));

        info!(
            episodes = state.records.len(),
            frames = state.total_frames,
            shards = state.data_files.len(),
            videos = video_files.len(),
            "Writer finalized"
        );
        Ok(WriterSummary {
            root: state.layout.root().to_path_buf(),
            artifacts,
            data_files: state.data_files,
            video_files,
            records: state.records,
            total_frames: state.total_frames,
            video_frames,
            total_tasks: state.catalog.len() as u64,
        })
    }
}
