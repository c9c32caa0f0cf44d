//! Columnar encoding of step rows.
//!
//! # Design
//!
//! - One row per step. Fixed columns come first (`episode_index`,
//!   `frame_index`, `index`, `timestamp`, flags, `task_index`, `action`,
//!   `reward`, `discount`), followed by one column per non-video
//!   observation feature in key order.
//! - The column set is derived from the dataset spec once per run, so all
//!   shards of a dataset share one schema.
//! - A value that is missing or does not fit its column is written as null.

use crate::error::Result;
use crate::parquet_io::{column, read_batches};
use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Float32Builder, Float64Builder, Int64Builder,
    ListBuilder, StringBuilder, UInt32Builder, UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datakit_core::{keys, DatasetSpec, Episode, FeatureSpec, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One flattened step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRow {
    /// Episode position in write order
    pub episode_index: u64,
    /// Global frame number across the dataset
    pub frame_index: u64,
    /// Step number within the episode
    pub index: u64,
    /// Step timestamp
    pub timestamp: Option<f64>,
    /// First-step flag
    pub is_first: bool,
    /// Last-step flag
    pub is_last: bool,
    /// Terminal flag
    pub is_terminal: bool,
    /// Task id
    pub task_index: Option<u32>,
    /// Action vector
    pub action: Option<Vec<f32>>,
    /// Reward
    pub reward: Option<f64>,
    /// Discount
    pub discount: Option<f64>,
    /// Feature values aligned with [`StepCodec::feature_keys`]
    pub features: Vec<Option<Value>>,
}

/// Arrow representation of one observation feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    F32List,
    F64List,
    I64List,
    BoolList,
    F64,
    I64,
    Bool,
    Utf8,
    Binary,
}

impl ColumnKind {
    fn for_feature(feature: &FeatureSpec) -> Self {
        let dtype = feature.dtype.as_str();
        if feature.shape.is_empty() {
            match dtype {
                "float64" | "float32" => ColumnKind::F64,
                "int64" | "int32" | "uint8" => ColumnKind::I64,
                "bool" => ColumnKind::Bool,
                "bytes" => ColumnKind::Binary,
                _ => ColumnKind::Utf8,
            }
        } else {
            match dtype {
                "float32" => ColumnKind::F32List,
                "float64" => ColumnKind::F64List,
                "bool" => ColumnKind::BoolList,
                _ => ColumnKind::I64List,
            }
        }
    }

    fn data_type(&self) -> DataType {
        let list = |t: DataType| DataType::List(Arc::new(Field::new("item", t, true)));
        match self {
            ColumnKind::F32List => list(DataType::Float32),
            ColumnKind::F64List => list(DataType::Float64),
            ColumnKind::I64List => list(DataType::Int64),
            ColumnKind::BoolList => list(DataType::Boolean),
            ColumnKind::F64 => DataType::Float64,
            ColumnKind::I64 => DataType::Int64,
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Utf8 => DataType::Utf8,
            ColumnKind::Binary => DataType::Binary,
        }
    }

    fn builder(&self, capacity: usize) -> ColumnBuilder {
        match self {
            ColumnKind::F32List => ColumnBuilder::F32List(ListBuilder::new(Float32Builder::new())),
            ColumnKind::F64List => ColumnBuilder::F64List(ListBuilder::new(Float64Builder::new())),
            ColumnKind::I64List => ColumnBuilder::I64List(ListBuilder::new(Int64Builder::new())),
            ColumnKind::BoolList => ColumnBuilder::BoolList(ListBuilder::new(BooleanBuilder::new())),
            ColumnKind::F64 => ColumnBuilder::F64(Float64Builder::with_capacity(capacity)),
            ColumnKind::I64 => ColumnBuilder::I64(Int64Builder::with_capacity(capacity)),
            ColumnKind::Bool => ColumnBuilder::Bool(BooleanBuilder::with_capacity(capacity)),
            ColumnKind::Utf8 => ColumnBuilder::Utf8(StringBuilder::new()),
            ColumnKind::Binary => ColumnBuilder::Binary(BinaryBuilder::new()),
        }
    }
}

enum ColumnBuilder {
    F32List(ListBuilder<Float32Builder>),
    F64List(ListBuilder<Float64Builder>),
    I64List(ListBuilder<Int64Builder>),
    BoolList(ListBuilder<BooleanBuilder>),
    F64(Float64Builder),
    I64(Int64Builder),
    Bool(BooleanBuilder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
}

fn scalar(value: &Value) -> Option<f64> {
    value.to_f64_vec().and_then(|v| v.first().copied())
}

impl ColumnBuilder {
    /// Append a value; returns false when it did not fit and null was written.
    fn append(&mut self, value: Option<&Value>) -> bool {
        let numeric = value.and_then(Value::to_f64_vec);
        let fits = match self {
            ColumnBuilder::Utf8(_) => true,
            ColumnBuilder::Binary(_) => {
                matches!(value, None | Some(Value::Bytes(_)) | Some(Value::String(_)))
            }
            _ => value.is_none() || numeric.as_ref().is_some_and(|v| !v.is_empty()),
        };
        match self {
            ColumnBuilder::F32List(b) => match numeric {
                Some(v) => {
                    b.values().append_slice(&v.iter().map(|&x| x as f32).collect::<Vec<_>>());
                    b.append(true);
                }
                None => b.append(false),
            },
            ColumnBuilder::F64List(b) => match numeric {
                Some(v) => {
                    b.values().append_slice(&v);
                    b.append(true);
                }
                None => b.append(false),
            },
            ColumnBuilder::I64List(b) => match numeric {
                Some(v) => {
                    b.values().append_slice(&v.iter().map(|&x| x as i64).collect::<Vec<_>>());
                    b.append(true);
                }
                None => b.append(false),
            },
            ColumnBuilder::BoolList(b) => match numeric {
                Some(v) => {
                    b.values().append_slice(&v.iter().map(|&x| x != 0.0).collect::<Vec<_>>());
                    b.append(true);
                }
                None => b.append(false),
            },
            ColumnBuilder::F64(b) => b.append_option(value.and_then(scalar)),
            ColumnBuilder::I64(b) => b.append_option(value.and_then(scalar).map(|x| x as i64)),
            ColumnBuilder::Bool(b) => b.append_option(value.and_then(scalar).map(|x| x != 0.0)),
            ColumnBuilder::Utf8(b) => match value {
                Some(Value::String(s)) => b.append_value(s),
                Some(Value::Bytes(bytes)) => b.append_value(String::from_utf8_lossy(bytes)),
                Some(other) => match serde_json::to_string(other) {
                    Ok(json) => b.append_value(json),
                    Err(_) => b.append_null(),
                },
                None => b.append_null(),
            },
            ColumnBuilder::Binary(b) => match value {
                Some(Value::Bytes(bytes)) => b.append_value(bytes),
                Some(Value::String(s)) => b.append_value(s.as_bytes()),
                _ => b.append_null(),
            },
        }
        fits
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::F32List(mut b) => Arc::new(b.finish()),
            ColumnBuilder::F64List(mut b) => Arc::new(b.finish()),
            ColumnBuilder::I64List(mut b) => Arc::new(b.finish()),
            ColumnBuilder::BoolList(mut b) => Arc::new(b.finish()),
            ColumnBuilder::F64(mut b) => Arc::new(b.finish()),
            ColumnBuilder::I64(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Bool(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Utf8(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Binary(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Schema-bound encoder from episodes to step record batches.
#[derive(Debug, Clone)]
pub struct StepCodec {
    features: Vec<(String, ColumnKind)>,
    schema: SchemaRef,
}

impl StepCodec {
    /// Codec for the non-video features of `spec`.
    pub fn new(spec: &DatasetSpec) -> Self {
        let features: Vec<(String, ColumnKind)> = spec
            .row_features()
            .map(|(key, f)| (key.clone(), ColumnKind::for_feature(f)))
            .collect();

        let action = DataType::List(Arc::new(Field::new("item", DataType::Float32, true)));
        let mut fields = vec![
            Field::new("episode_index", DataType::UInt64, false),
            Field::new("frame_index", DataType::UInt64, false),
            Field::new("index", DataType::UInt64, false),
            Field::new("timestamp", DataType::Float64, true),
            Field::new("is_first", DataType::Boolean, false),
            Field::new("is_last", DataType::Boolean, false),
            Field::new("is_terminal", DataType::Boolean, false),
            Field::new("task_index", DataType::UInt32, true),
            Field::new("action", action, true),
            Field::new("reward", DataType::Float64, true),
            Field::new("discount", DataType::Float64, true),
        ];
        for (key, kind) in &features {
            fields.push(Field::new(keys::column_name(key), kind.data_type(), true));
        }
        StepCodec {
            features,
            schema: Arc::new(Schema::new(fields)),
        }
    }

    /// Arrow schema of every shard
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Observation keys stored as columns, in column order
    pub fn feature_keys(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|(k, _)| k.as_str())
    }

    /// Flatten `episode` into rows. Frame indices start at `first_frame`.
    pub fn rows(
        &self,
        episode: &Episode,
        episode_index: u64,
        first_frame: u64,
        task_index: Option<u32>,
    ) -> Vec<StepRow> {
        episode
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRow {
                episode_index,
                frame_index: first_frame + i as u64,
                index: i as u64,
                timestamp: step.timestamp,
                is_first: step.is_first,
                is_last: step.is_last,
                is_terminal: step.is_terminal,
                task_index,
                action: step.action.clone(),
                reward: step.reward,
                discount: step.discount,
                features: self
                    .features
                    .iter()
                    .map(|(key, _)| step.observation.get(key).cloned())
                    .collect(),
            })
            .collect()
    }

    /// Build one record batch from buffered rows.
    pub fn encode(&self, rows: &[StepRow]) -> Result<RecordBatch> {
        let n = rows.len();
        let mut episode_index = UInt64Builder::with_capacity(n);
        let mut frame_index = UInt64Builder::with_capacity(n);
        let mut index = UInt64Builder::with_capacity(n);
        let mut timestamp = Float64Builder::with_capacity(n);
        let mut is_first = BooleanBuilder::with_capacity(n);
        let mut is_last = BooleanBuilder::with_capacity(n);
        let mut is_terminal = BooleanBuilder::with_capacity(n);
        let mut task_index = UInt32Builder::with_capacity(n);
        let mut action = ListBuilder::new(Float32Builder::new());
        let mut reward = Float64Builder::with_capacity(n);
        let mut discount = Float64Builder::with_capacity(n);
        let mut features: Vec<ColumnBuilder> =
            self.features.iter().map(|(_, kind)| kind.builder(n)).collect();

        let mut mismatched = 0usize;
        for row in rows {
            episode_index.append_value(row.episode_index);
            frame_index.append_value(row.frame_index);
            index.append_value(row.index);
            timestamp.append_option(row.timestamp);
            is_first.append_value(row.is_first);
            is_last.append_value(row.is_last);
            is_terminal.append_value(row.is_terminal);
            task_index.append_option(row.task_index);
            match &row.action {
                Some(a) => {
                    action.values().append_slice(a);
                    action.append(true);
                }
                None => action.append(false),
            }
            reward.append_option(row.reward);
            discount.append_option(row.discount);
            for (builder, value) in features.iter_mut().zip(&row.features) {
                if !builder.append(value.as_ref()) {
                    mismatched += 1;
                }
            }
        }
        if mismatched > 0 {
            debug!(mismatched, "Feature values written as null");
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(episode_index.finish()),
            Arc::new(frame_index.finish()),
            Arc::new(index.finish()),
            Arc::new(timestamp.finish()),
            Arc::new(is_first.finish()),
            Arc::new(is_last.finish()),
            Arc::new(is_terminal.finish()),
            Arc::new(task_index.finish()),
            Arc::new(action.finish()),
            Arc::new(reward.finish()),
            Arc::new(discount.finish()),
        ];
        columns.extend(features.into_iter().map(ColumnBuilder::finish));
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

/// `episode_index` column of a step shard, in row order.
pub fn read_episode_indices(path: &Path) -> Result<Vec<u64>> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let col = column::<UInt64Array>(&batch, "episode_index")?;
        out.extend(col.values().iter().copied());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet_io::{parquet_num_rows, write_batches};
    use arrow::array::{Array, ListArray, StringArray};
    use datakit_core::{Step, Tensor};

    fn spec_and_episode() -> (DatasetSpec, Episode) {
        let steps = (0..3)
            .map(|i| {
                let s = Step::default()
                    .with_observation("observation.images.front", Tensor::rgb(2, 2))
                    .with_observation("observation.state", Tensor::vector(vec![i as f32, 1.0]))
                    .with_observation("observation.language", "pour")
                    .with_timestamp(i as f64 * 0.1)
                    .with_flags(i == 0, i == 2, i == 2);
                if i < 2 {
                    s.with_action(vec![0.5; 3])
                } else {
                    s
                }
            })
            .collect();
        let mut ep = Episode::new("e0", "d", steps);
        ep.task_id = Some(0);
        let mut spec = DatasetSpec::new("d", "d");
        spec.infer_schema(&ep);
        (spec, ep)
    }

    #[test]
    fn test_schema_excludes_video_features() {
        let (spec, _) = spec_and_episode();
        let codec = StepCodec::new(&spec);
        let names: Vec<String> = codec.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert!(names.contains(&"observation_state".to_string()));
        assert!(names.contains(&"observation_language".to_string()));
        assert!(!names.iter().any(|n| n.contains("images")));
    }

    #[test]
    fn test_encode_and_read_back() {
        let (spec, ep) = spec_and_episode();
        let codec = StepCodec::new(&spec);
        let rows = codec.rows(&ep, 4, 100, ep.task_id);
        assert_eq!(rows[2].frame_index, 102);

        let batch = codec.encode(&rows).unwrap();
        assert_eq!(batch.num_rows(), 3);
        let action = column::<ListArray>(&batch, "action").unwrap();
        assert!(action.is_valid(0));
        assert!(action.is_null(2));
        let language = column::<StringArray>(&batch, "observation_language").unwrap();
        assert_eq!(language.value(1), "pour");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/chunk-000/steps_00000.parquet");
        write_batches(&path, codec.schema(), &[batch]).unwrap();
        assert_eq!(parquet_num_rows(&path).unwrap(), 3);
        assert_eq!(read_episode_indices(&path).unwrap(), vec![4, 4, 4]);
    }

    #[test]
    fn test_missing_feature_is_null() {
        let (spec, mut ep) = spec_and_episode();
        ep.steps[1].observation.remove("observation.state");
        let codec = StepCodec::new(&spec);
        let batch = codec.encode(&codec.rows(&ep, 0, 0, None)).unwrap();
        let state = column::<ListArray>(&batch, "observation_state").unwrap();
        assert!(state.is_null(1));
        assert_eq!(state.null_count(), 1);
    }
}
