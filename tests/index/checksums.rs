//! Checksums written at finalize and re-verified on demand.

use crate::built;
use crate::common::*;
use datakit::datakit_storage::layout::{CHECKSUMS_FILE, MANIFEST_FILE};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;

fn recorded(root: &std::path::Path) -> BTreeMap<String, String> {
    serde_json::from_str(&std::fs::read_to_string(root.join(CHECKSUMS_FILE)).unwrap()).unwrap()
}

#[test]
fn test_checksums_cover_shards_and_metadata() {
    let (dir, dataset) = built();
    let sums = recorded(dir.path());

    for record in dataset.records() {
        assert!(sums.contains_key(&record.parquet_file), "{}", record.parquet_file);
        for locator in record.video_offsets.values() {
            assert!(sums.contains_key(&locator.video_file), "{}", locator.video_file);
        }
    }
    assert!(sums.contains_key("meta/info.json"));
    assert!(!sums.contains_key(MANIFEST_FILE));
    assert!(!sums.contains_key(CHECKSUMS_FILE));
    assert!(sums.keys().all(|k| !k.starts_with("reports/")));
    assert!(sums.values().all(|v| v.len() == 64));
}

#[test]
fn test_reports_are_listed_in_manifest() {
    let (_dir, dataset) = built();
    let artifacts = &dataset.manifest().unwrap().artifacts;
    assert!(artifacts.iter().any(|a| a == "reports/validation_summary.json"));
    assert!(artifacts.iter().any(|a| a == "reports/findings.jsonl"));
}

#[test]
fn test_modified_shard_fails_verification() {
    let (dir, dataset) = built();
    let shard = dataset.records()[0].parquet_file.clone();
    let mut file = OpenOptions::new().append(true).open(dir.path().join(&shard)).unwrap();
    file.write_all(b"tampered").unwrap();

    let err = dataset.verify().unwrap_err();
    assert!(err.is_verification());
    assert!(err.to_string().contains(&format!("{shard}: checksum mismatch")), "{err}");
}

#[test]
fn test_missing_video_fails_verification() {
    let (dir, dataset) = built();
    let video = dataset.records()[0].video_offsets["front"].video_file.clone();
    std::fs::remove_file(dir.path().join(&video)).unwrap();

    let err = dataset.verify().unwrap_err();
    assert!(err.to_string().contains(&format!("{video}: missing")), "{err}");
}

#[test]
fn test_recompile_seals_only_current_shards() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.sharding.rows_per_shard = 5;
    compile(synthetic_episodes(3, 7), config.clone(), dir.path());
    assert!(dir.path().join("data/chunk-000/steps_00001.parquet").is_file());

    let (dataset, _) = compile(synthetic_episodes(1, 8), config, dir.path());

    let shards: Vec<String> = recorded(dir.path())
        .into_keys()
        .filter(|k| k.starts_with("data/"))
        .collect();
    assert_eq!(shards, vec!["data/chunk-000/steps_00000.parquet".to_string()]);
    assert!(dataset.verify().is_ok());
}
