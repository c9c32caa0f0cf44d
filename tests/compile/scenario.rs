//! Successful builds and the layout they leave behind.

use crate::common::*;
use datakit::datakit_storage::layout::{CHECKSUMS_FILE, MANIFEST_FILE, TASKS_FILE};
use datakit::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn test_compile_synthetic_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let episodes = synthetic_episodes(12, 7);
    let expected_frames: usize = episodes.iter().map(|e| e.num_steps()).sum();

    let (dataset, result) = compile(episodes, test_config(), dir.path());

    assert!(result.success);
    assert!(!result.aborted);
    assert_eq!(result.episodes_written, 12);
    assert_eq!(result.episodes_rejected, 0);
    assert_eq!(result.total_frames as usize, expected_frames);

    assert_eq!(dataset.len(), 12);
    let info = dataset.info().expect("info.json");
    assert_eq!(info.total_episodes, 12);
    assert_eq!(info.total_frames as usize, expected_frames);

    let manifest = dataset.manifest().expect("manifest");
    assert_eq!(manifest.status, RunStatus::Completed);
    assert_eq!(manifest.episode_count, 12);
    assert_eq!(dataset.build_id(), Some(result.build_id()));
    assert_eq!(result.spec.canonical_camera.as_deref(), Some("front"));

    assert!(dir.path().join(CHECKSUMS_FILE).is_file());
    assert!(dir.path().join(MANIFEST_FILE).is_file());
    assert!(dir.path().join("reports/validation_summary.json").is_file());
    dataset.verify().unwrap();
}

#[test]
fn test_records_follow_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, _) = compile(synthetic_episodes(6, 1), test_config(), dir.path());

    let ids: Vec<&str> = dataset.records().iter().map(|r| r.episode_id.as_str()).collect();
    let expected: Vec<String> = (0..6).map(episode_id).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    for (i, record) in dataset.records().iter().enumerate() {
        assert_eq!(record.episode_index, i as u64);
        assert_eq!(record.robot_id, ROBOTS[i % ROBOTS.len()]);
        assert_eq!(record.dataset_name, "synthetic");
    }
}

#[test]
fn test_row_ranges_are_contiguous_per_shard() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.sharding.rows_per_shard = 20;
    let (dataset, _) = compile(synthetic_episodes(10, 3), config, dir.path());

    let records = dataset.records();
    let files: BTreeSet<&str> = records.iter().map(|r| r.parquet_file.as_str()).collect();
    assert!(files.len() > 1, "expected several shards, got {:?}", files);

    let mut previous: Option<(&str, u64)> = None;
    for record in records {
        assert_eq!(record.parquet_row_end - record.parquet_row_start, record.num_steps);
        match previous {
            Some((file, end)) if file == record.parquet_file => assert_eq!(record.parquet_row_start, end),
            _ => assert_eq!(record.parquet_row_start, 0),
        }
        previous = Some((record.parquet_file.as_str(), record.parquet_row_end));
        assert!(dir.path().join(&record.parquet_file).is_file());
    }
}

#[test]
fn test_video_offsets_cover_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, _) = compile(synthetic_episodes(5, 11), test_config(), dir.path());

    let mut next_frame: BTreeMap<String, u64> = BTreeMap::new();
    for record in dataset.records() {
        let locator = record.video_offsets.get("front").expect("front camera");
        assert_eq!(locator.num_frames, record.num_steps);
        let expected_start = next_frame.get(&locator.video_file).copied().unwrap_or(0);
        assert_eq!(locator.start_frame, expected_start);
        next_frame.insert(locator.video_file.clone(), locator.start_frame + locator.num_frames);
    }

    // Raw shards hold 16x16 rgb24 frames back to back
    for (file, frames) in next_frame {
        let len = std::fs::metadata(dir.path().join(&file)).unwrap().len();
        assert_eq!(len, frames * 16 * 16 * 3, "{}", file);
    }
}

#[test]
fn test_task_catalog_is_shared_across_episodes() {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, _) = compile(synthetic_episodes(9, 5), test_config(), dir.path());

    let tasks = std::fs::read_to_string(dir.path().join(TASKS_FILE)).unwrap();
    assert_eq!(tasks.lines().count(), TASKS.len());

    for (i, record) in dataset.records().iter().enumerate() {
        assert_eq!(record.task_text.as_deref(), Some(TASKS[i % TASKS.len()]));
        let same_task = &dataset.records()[i % TASKS.len()];
        assert_eq!(record.task_id, same_task.task_id);
    }
}

#[test]
fn test_selector_limits_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (dataset, result) = Dataset::builder()
        .config(test_config())
        .selector(Selector::parse("[2:5]").unwrap())
        .raw_video()
        .compile(&mut adapter(synthetic_episodes(8, 2)), dir.path())
        .unwrap();

    assert_eq!(result.episodes_written, 3);
    let ids: Vec<String> = dataset.records().iter().map(|r| r.episode_id.clone()).collect();
    assert_eq!(ids, vec![episode_id(2), episode_id(3), episode_id(4)]);
}

#[test]
fn test_jsonl_source() {
    let source = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    JsonlAdapter::write_split(source.path(), "train", &synthetic_episodes(4, 9)).unwrap();

    let (dataset, result) = Dataset::builder()
        .config(test_config())
        .raw_video()
        .compile(&mut JsonlAdapter::new(source.path()), out.path())
        .unwrap();

    assert!(result.success);
    assert_eq!(dataset.len(), 4);
    dataset.verify().unwrap();
}

#[test]
fn test_same_inputs_same_assignment() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let (first, _) = compile(synthetic_episodes(10, 4), test_config(), a.path());
    let (second, _) = compile(synthetic_episodes(10, 4), test_config(), b.path());

    let manifest_a = first.manifest().unwrap();
    let manifest_b = second.manifest().unwrap();
    assert_eq!(manifest_a.config_hash, manifest_b.config_hash);

    let splits = |d: &Dataset| d.records().iter().map(|r| r.split).collect::<Vec<_>>();
    assert_eq!(splits(&first), splits(&second));
}

#[test]
fn test_split_assignment_ignores_processing_order() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let mut reversed = synthetic_episodes(10, 5);
    reversed.reverse();
    let (forward, _) = compile(synthetic_episodes(10, 5), test_config(), a.path());
    let (backward, _) = compile(reversed, test_config(), b.path());

    let splits = |d: &Dataset| -> BTreeMap<String, Split> {
        d.records().iter().map(|r| (r.episode_id.clone(), r.split)).collect()
    };
    assert_eq!(forward.records()[0].episode_id, backward.records()[9].episode_id);
    assert_eq!(splits(&forward), splits(&backward));
}
