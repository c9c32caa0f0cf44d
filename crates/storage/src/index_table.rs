//! Episode index table (`meta/episodes/episodes.parquet`).
//!
//! One row per [`EpisodeIndexRecord`]. `video_offsets` is a nested map, so
//! it is stored as a JSON string column; everything else is a flat column
//! named after the record field.

use crate::error::{Result, StorageError};
use crate::parquet_io::{column, read_batches, write_batches};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, StringArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datakit_core::{EpisodeIndexRecord, Split, VideoLocator};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Arrow schema of the index table.
pub fn index_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("episode_id", DataType::Utf8, false),
        Field::new("episode_index", DataType::UInt64, false),
        Field::new("dataset_name", DataType::Utf8, false),
        Field::new("robot_id", DataType::Utf8, false),
        Field::new("task_id", DataType::UInt32, true),
        Field::new("task_text", DataType::Utf8, true),
        Field::new("num_steps", DataType::UInt64, false),
        Field::new("duration_secs", DataType::Float64, false),
        Field::new("start_timestamp", DataType::Float64, false),
        Field::new("end_timestamp", DataType::Float64, false),
        Field::new("camera_set", DataType::Utf8, false),
        Field::new("action_space_type", DataType::Utf8, false),
        Field::new("invalid", DataType::Boolean, false),
        Field::new("source_uri", DataType::Utf8, false),
        Field::new("split", DataType::Utf8, false),
        Field::new("parquet_file", DataType::Utf8, false),
        Field::new("parquet_row_start", DataType::UInt64, false),
        Field::new("parquet_row_end", DataType::UInt64, false),
        Field::new("video_offsets", DataType::Utf8, false),
        Field::new("schema_version", DataType::Utf8, false),
    ]))
}

fn strings<'a>(records: &'a [EpisodeIndexRecord], f: impl Fn(&'a EpisodeIndexRecord) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<&str>>()))
}

fn u64s(records: &[EpisodeIndexRecord], f: impl Fn(&EpisodeIndexRecord) -> u64) -> ArrayRef {
    Arc::new(UInt64Array::from(records.iter().map(f).collect::<Vec<u64>>()))
}

fn f64s(records: &[EpisodeIndexRecord], f: impl Fn(&EpisodeIndexRecord) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from(records.iter().map(f).collect::<Vec<f64>>()))
}

/// Encode records as one batch.
pub fn records_to_batch(records: &[EpisodeIndexRecord]) -> Result<RecordBatch> {
    let offsets = records
        .iter()
        .map(|r| serde_json::to_string(&r.video_offsets))
        .collect::<std::result::Result<Vec<String>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        strings(records, |r| r.episode_id.as_str()),
        u64s(records, |r| r.episode_index),
        strings(records, |r| r.dataset_name.as_str()),
        strings(records, |r| r.robot_id.as_str()),
        Arc::new(UInt32Array::from(records.iter().map(|r| r.task_id).collect::<Vec<_>>())),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.task_text.as_deref()).collect::<Vec<Option<&str>>>(),
        )),
        u64s(records, |r| r.num_steps),
        f64s(records, |r| r.duration_secs),
        f64s(records, |r| r.start_timestamp),
        f64s(records, |r| r.end_timestamp),
        strings(records, |r| r.camera_set.as_str()),
        strings(records, |r| r.action_space_type.as_str()),
        Arc::new(BooleanArray::from(records.iter().map(|r| r.invalid).collect::<Vec<bool>>())),
        strings(records, |r| r.source_uri.as_str()),
        strings(records, |r| r.split.as_str()),
        strings(records, |r| r.parquet_file.as_str()),
        u64s(records, |r| r.parquet_row_start),
        u64s(records, |r| r.parquet_row_end),
        Arc::new(StringArray::from(offsets.iter().map(String::as_str).collect::<Vec<&str>>())),
        strings(records, |r| r.schema_version.as_str()),
    ];
    Ok(RecordBatch::try_new(index_schema(), columns)?)
}

/// Decode one batch into records.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<EpisodeIndexRecord>> {
    let episode_id = column::<StringArray>(batch, "episode_id")?;
    let episode_index = column::<UInt64Array>(batch, "episode_index")?;
    let dataset_name = column::<StringArray>(batch, "dataset_name")?;
    let robot_id = column::<StringArray>(batch, "robot_id")?;
    let task_id = column::<UInt32Array>(batch, "task_id")?;
    let task_text = column::<StringArray>(batch, "task_text")?;
    let num_steps = column::<UInt64Array>(batch, "num_steps")?;
    let duration = column::<Float64Array>(batch, "duration_secs")?;
    let start = column::<Float64Array>(batch, "start_timestamp")?;
    let end = column::<Float64Array>(batch, "end_timestamp")?;
    let camera_set = column::<StringArray>(batch, "camera_set")?;
    let action_space = column::<StringArray>(batch, "action_space_type")?;
    let invalid = column::<BooleanArray>(batch, "invalid")?;
    let source_uri = column::<StringArray>(batch, "source_uri")?;
    let split = column::<StringArray>(batch, "split")?;
    let parquet_file = column::<StringArray>(batch, "parquet_file")?;
    let row_start = column::<UInt64Array>(batch, "parquet_row_start")?;
    let row_end = column::<UInt64Array>(batch, "parquet_row_end")?;
    let video_offsets = column::<StringArray>(batch, "video_offsets")?;
    let schema_version = column::<StringArray>(batch, "schema_version")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let split = Split::parse(split.value(i))
            .ok_or_else(|| StorageError::Schema(format!("unknown split '{}'", split.value(i))))?;
        let offsets: BTreeMap<String, VideoLocator> = serde_json::from_str(video_offsets.value(i))?;
        records.push(EpisodeIndexRecord {
            episode_id: episode_id.value(i).to_string(),
            episode_index: episode_index.value(i),
            dataset_name: dataset_name.value(i).to_string(),
            robot_id: robot_id.value(i).to_string(),
            task_id: task_id.is_valid(i).then(|| task_id.value(i)),
            task_text: task_text.is_valid(i).then(|| task_text.value(i).to_string()),
            num_steps: num_steps.value(i),
            duration_secs: duration.value(i),
            start_timestamp: start.value(i),
            end_timestamp: end.value(i),
            camera_set: camera_set.value(i).to_string(),
            action_space_type: action_space.value(i).to_string(),
            invalid: invalid.value(i),
            source_uri: source_uri.value(i).to_string(),
            split,
            parquet_file: parquet_file.value(i).to_string(),
            parquet_row_start: row_start.value(i),
            parquet_row_end: row_end.value(i),
            video_offsets: offsets,
            schema_version: schema_version.value(i).to_string(),
        });
    }
    Ok(records)
}

/// Write the index table to `path`.
pub fn write_index(path: &Path, records: &[EpisodeIndexRecord]) -> Result<()> {
    let batch = records_to_batch(records)?;
    write_batches(path, index_schema(), &[batch])
}

/// Read every record of an index table.
pub fn read_index(path: &Path) -> Result<Vec<EpisodeIndexRecord>> {
    let mut records = Vec::new();
    for batch in read_batches(path)? {
        records.extend(batch_to_records(&batch)?);
    }
    Ok(records)
}
