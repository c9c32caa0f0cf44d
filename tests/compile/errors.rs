//! Configuration errors and fatal failures.

use crate::common::*;
use datakit::datakit_storage::layout::MANIFEST_FILE;
use datakit::datakit_storage::{LeRobotV3Writer, RawFrameEncoderFactory};
use datakit::prelude::*;
use std::sync::Arc;

fn failed_manifest(root: &std::path::Path) -> RunManifest {
    let manifest = RunManifest::load(&root.join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.status, RunStatus::Failed);
    manifest
}

#[test]
fn test_invalid_config_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let mut config = test_config();
    config.sharding.rows_per_shard = 0;

    let err = Dataset::builder()
        .config(config)
        .raw_video()
        .compile(&mut adapter(synthetic_episodes(2, 1)), &out)
        .unwrap_err();

    assert!(err.is_config(), "{err}");
    assert!(!out.exists());
}

#[test]
fn test_unknown_stage_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pipeline = PipelineSpec {
        transforms: vec![StageSpec::new("flip_horizontal")],
        validators: Vec::new(),
    };

    let err = Dataset::builder()
        .pipeline(pipeline)
        .raw_video()
        .compile(&mut adapter(synthetic_episodes(2, 1)), &out)
        .unwrap_err();

    assert!(err.is_config());
    assert!(err.to_string().contains("flip_horizontal"));
    assert!(!out.exists());
}

#[test]
fn test_bad_stage_params_are_config_error() {
    let pipeline = PipelineSpec {
        transforms: vec![StageSpec::with_params("resize_images", serde_json::json!({"size": 3}))],
        validators: Vec::new(),
    };
    let err = Compiler::from_pipeline(test_config(), &pipeline, &Registry::new()).err().unwrap();
    assert!(err.to_string().contains("resize_images"));
}

#[test]
fn test_malformed_selectors() {
    for bad in ["[5:2]", "[-1:3]", "[a:b]", "[1:2:3]"] {
        let err: Error = Selector::parse(bad).unwrap_err().into();
        assert!(err.is_config(), "{bad}");
    }
}

#[test]
fn test_unknown_split_seals_failed_manifest() {
    let dir = tempfile::tempdir().unwrap();

    let err = Dataset::builder()
        .config(test_config())
        .split("test")
        .raw_video()
        .compile(&mut adapter(synthetic_episodes(2, 1)), dir.path())
        .unwrap_err();

    assert!(err.is_fatal_io(), "{err}");
    let manifest = failed_manifest(dir.path());
    assert!(manifest.error.unwrap().contains("test"));
}

#[test]
fn test_corrupt_source_line_seals_failed_manifest() {
    let source = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = JsonlAdapter::write_split(source.path(), "train", &synthetic_episodes(3, 2)).unwrap();
    let mut body = std::fs::read_to_string(&path).unwrap();
    body.push_str("{not json}\n");
    std::fs::write(&path, body).unwrap();

    let err = Dataset::builder()
        .config(test_config())
        .raw_video()
        .compile(&mut JsonlAdapter::new(source.path()), out.path())
        .unwrap_err();

    assert!(err.is_fatal_io());
    assert!(err.to_string().contains(":4:"), "{err}");
    failed_manifest(out.path());
}

#[test]
fn test_cancelled_run_is_not_completed() {
    let dir = tempfile::tempdir().unwrap();
    let mut compiler = Compiler::from_config(test_config()).unwrap();
    compiler.cancel_handle().cancel();
    let mut writer = LeRobotV3Writer::with_encoder(test_config().writer_options(), Arc::new(RawFrameEncoderFactory));

    let result = compiler
        .compile(&mut adapter(synthetic_episodes(3, 3)), &mut writer, dir.path())
        .unwrap();

    assert!(result.cancelled);
    assert!(!result.success);
    assert_eq!(result.episodes_written, 0);
    assert_eq!(failed_manifest(dir.path()).error.as_deref(), Some("cancelled"));
}

#[test]
fn test_open_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let err = Dataset::open(dir.path().join("nothing")).err().unwrap();
    assert!(err.is_not_found());

    // A directory without an index is not a dataset either
    let err = Dataset::open(dir.path()).err().unwrap();
    assert!(err.is_not_found());
}
