//! Slice materialization.

use crate::built;
use datakit::datakit_storage::layout::{INFO_FILE, SLICE_MANIFEST_FILE, TASKS_FILE};
use datakit::prelude::*;
use std::path::Path;

fn franka() -> QueryFilter {
    QueryFilter::all().robots(["franka"])
}

#[test]
fn test_view_slice_references_parent() {
    let (dir, dataset) = built();
    let out = tempfile::tempdir().unwrap();

    let manifest = dataset.slice(&franka(), out.path(), SliceMode::View, "franka").unwrap();
    assert_eq!(manifest.slice_id, "franka");
    assert_eq!(manifest.mode, SliceMode::View);
    assert_eq!(manifest.episode_ids.len(), 4);
    assert_eq!(Some(manifest.parent_build_id.as_str()), dataset.build_id());
    assert!(out.path().join(SLICE_MANIFEST_FILE).is_file());

    let slice = Dataset::open(out.path()).unwrap();
    assert_eq!(slice.len(), 4);
    assert!(slice.info().is_none());
    for record in slice.records() {
        let parquet = Path::new(&record.parquet_file);
        assert!(parquet.is_absolute());
        assert!(parquet.starts_with(dir.path()));
        assert!(parquet.is_file());
    }
}

#[test]
fn test_copy_slice_is_self_contained() {
    let (_dir, dataset) = built();
    let out = tempfile::tempdir().unwrap();

    dataset.slice(&franka(), out.path(), SliceMode::Copy, "franka").unwrap();

    let slice = Dataset::open(out.path()).unwrap();
    assert_eq!(slice.len(), 4);
    assert!(out.path().join(INFO_FILE).is_file());
    assert!(out.path().join(TASKS_FILE).is_file());

    let parent: Vec<_> = dataset.query(&franka()).unwrap();
    for (copied, original) in slice.records().iter().zip(&parent) {
        assert_eq!(copied.parquet_file, original.parquet_file);
        assert_eq!(copied.parquet_row_start, original.parquet_row_start);
        assert!(out.path().join(&copied.parquet_file).is_file());
        for locator in copied.video_offsets.values() {
            assert!(out.path().join(&locator.video_file).is_file());
        }
    }
}

#[test]
fn test_copy_from_view_slice() {
    let (_dir, dataset) = built();
    let view = tempfile::tempdir().unwrap();
    let copy = tempfile::tempdir().unwrap();

    dataset.slice(&franka(), view.path(), SliceMode::View, "view").unwrap();
    let view = Dataset::open(view.path()).unwrap();
    let manifest = view.slice(&QueryFilter::all(), copy.path(), SliceMode::Copy, "copy").unwrap();

    assert_eq!(manifest.episode_ids.len(), 4);
    let copied = Dataset::open(copy.path()).unwrap();
    for record in copied.records() {
        assert!(Path::new(&record.parquet_file).is_relative());
        assert!(copy.path().join(&record.parquet_file).is_file());
    }
}

#[test]
fn test_slice_into_parent_is_rejected() {
    let (dir, dataset) = built();
    let err = dataset.slice(&franka(), dir.path(), SliceMode::Copy, "self").unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_slice_filter_is_recorded() {
    let (_dir, dataset) = built();
    let out = tempfile::tempdir().unwrap();
    let filter = franka().steps(Some(1), None);

    dataset.slice(&filter, out.path(), SliceMode::View, "long").unwrap();

    let raw = std::fs::read_to_string(out.path().join(SLICE_MANIFEST_FILE)).unwrap();
    let stored: SliceManifest = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.query_filter, filter);
}
