//! Dataset cards generated from compiled roots.

use crate::built;
use crate::common::*;
use datakit::datakit_index::CARD_FILE;

#[test]
fn test_card_summarizes_compiled_dataset() {
    let (_dir, dataset) = built();
    let card = dataset.card().unwrap();

    assert_eq!(card.name, "synthetic");
    assert_eq!(card.num_episodes, 12);
    assert_eq!(card.num_frames, dataset.records().iter().map(|r| r.num_steps).sum::<u64>());
    let mut robots = ROBOTS.to_vec();
    robots.sort_unstable();
    assert_eq!(card.robot_types, robots);
    assert!(card.cameras.iter().any(|c| c == "front"));
    assert_eq!(card.splits.values().sum::<u64>(), 12);
    assert_eq!(card.action_dim, Some(7));
    assert_eq!(card.action_stats.as_ref().map(|s| s.mean.len()), Some(7));
    assert_eq!(card.total_tasks, TASKS.len());
}

#[test]
fn test_write_card_leaves_checksums_intact() {
    let (dir, dataset) = built();
    let path = dataset.write_card().unwrap();

    assert_eq!(path, dir.path().join(CARD_FILE));
    let md = std::fs::read_to_string(&path).unwrap();
    assert!(md.contains("# synthetic\n"));
    assert!(md.contains("- **Episodes**: 12\n"));
    assert!(md.contains("## Action Statistics"));
    dataset.verify().unwrap();
}
