//! Parquet file helpers shared by the step and index codecs.

use crate::error::{Result, StorageError};
use arrow::array::Array;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::{self, File};
use std::path::Path;

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_created_by(format!("datakit {}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Write `batches` to `path` atomically (temp file + rename).
pub fn write_batches(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("parquet.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties()))?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.close()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read every record batch of a parquet file.
pub fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

/// Row count from the file footer, without decoding data pages.
pub fn parquet_num_rows(path: &Path) -> Result<u64> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let rows = reader.metadata().file_metadata().num_rows();
    u64::try_from(rows).map_err(|_| StorageError::Parquet(format!("negative row count in {}", path.display())))
}

/// Typed column lookup.
pub fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|e| StorageError::Schema(format!("missing column '{name}': {e}")))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::Schema(format!("column '{name}' has an unexpected type")))
}
