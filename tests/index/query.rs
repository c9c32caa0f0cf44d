//! Index queries.

use crate::built;
use crate::common::*;
use datakit::datakit_core::split_for;
use datakit::prelude::*;

#[test]
fn test_filter_by_robot() {
    let (_dir, dataset) = built();
    let franka = dataset.query(&QueryFilter::all().robots(["franka"])).unwrap();
    assert_eq!(franka.len(), 4);
    assert!(franka.iter().all(|r| r.robot_id == "franka"));

    let two = dataset.count(&QueryFilter::all().robots(["franka", "ur5"])).unwrap();
    assert_eq!(two, 8);
}

#[test]
fn test_task_text_regex_is_case_insensitive() {
    let (_dir, dataset) = built();
    let cups = dataset.query(&QueryFilter::all().task_text("CUP")).unwrap();
    assert_eq!(cups.len(), 4);
    assert!(cups.iter().all(|r| r.robot_id == "franka"));

    let none = QueryFilter::all().robots(["widowx"]).task_text("cup");
    assert_eq!(dataset.count(&none).unwrap(), 0);
}

#[test]
fn test_filter_by_task_id() {
    let (_dir, dataset) = built();
    let first = dataset.records()[0].task_id.expect("task id");
    let same = dataset.query(&QueryFilter::all().tasks([first])).unwrap();
    assert_eq!(same.len(), 4);
    assert!(same.iter().all(|r| r.task_text.as_deref() == Some(TASKS[0])));
}

#[test]
fn test_step_bounds_are_inclusive() {
    let (_dir, dataset) = built();
    let expected: Vec<&str> = dataset
        .records()
        .iter()
        .filter(|r| (7..=10).contains(&r.num_steps))
        .map(|r| r.episode_id.as_str())
        .collect();
    let found = dataset.query(&QueryFilter::all().steps(Some(7), Some(10))).unwrap();
    let found: Vec<&str> = found.iter().map(|r| r.episode_id.as_str()).collect();
    assert_eq!(found, expected);
}

#[test]
fn test_camera_filter() {
    let (_dir, dataset) = built();
    assert_eq!(dataset.count(&QueryFilter::all().with_cameras(["front"])).unwrap(), 12);
    assert_eq!(dataset.count(&QueryFilter::all().with_cameras(["front", "wrist"])).unwrap(), 0);
}

#[test]
fn test_splits_partition_the_index() {
    let (_dir, dataset) = built();
    let config = test_config();
    let mut total = 0;
    for split in [Split::Train, Split::Val, Split::Test] {
        let records = dataset.query(&QueryFilter::all().in_split(split)).unwrap();
        for record in &records {
            assert_eq!(split_for(&record.episode_id, config.seed, config.split), split);
        }
        total += records.len();
    }
    assert_eq!(total, dataset.len());
}

#[test]
fn test_dataset_name_filter() {
    let (_dir, dataset) = built();
    assert_eq!(dataset.count(&QueryFilter::all().dataset("synthetic")).unwrap(), 12);
    assert_eq!(dataset.count(&QueryFilter::all().dataset("other")).unwrap(), 0);
}

#[test]
fn test_invalid_regex_is_config_error() {
    let (_dir, dataset) = built();
    let err = dataset.query(&QueryFilter::all().task_text("(unclosed")).unwrap_err();
    assert!(err.is_config());
}
