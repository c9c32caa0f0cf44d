//! Validation verdicts deciding what reaches the writer.

use crate::common::*;
use datakit::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Well-formed episode with a one second hole after step 2.
fn gap_episode(i: usize) -> Episode {
    let mut rng = StdRng::seed_from_u64(100 + i as u64);
    let mut episode = synthetic_episode(i, 6, &mut rng);
    for step in episode.steps.iter_mut().skip(3) {
        step.timestamp = step.timestamp.map(|t| t + 1.0);
    }
    episode
}

fn empty_episode(i: usize) -> Episode {
    Episode::new(episode_id(i), "synthetic", Vec::new())
}

fn ids(dataset: &Dataset) -> Vec<String> {
    dataset.records().iter().map(|r| r.episode_id.clone()).collect()
}

#[test]
fn test_rejected_episodes_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut episodes = synthetic_episodes(4, 21);
    episodes.insert(1, nan_action_episode(10));
    episodes.push(empty_episode(11));

    let (dataset, result) = compile(episodes, test_config(), dir.path());

    assert!(result.success);
    assert_eq!(result.episodes_written, 4);
    assert_eq!(result.episodes_rejected, 2);
    assert_eq!(result.report.total_episodes, 6);
    assert_eq!(result.report.error_episodes, 2);
    assert_eq!(ids(&dataset), (0..4).map(episode_id).collect::<Vec<_>>());
    dataset.verify().unwrap();
}

#[test]
fn test_warnings_mark_episodes_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let mut episodes = synthetic_episodes(3, 22);
    episodes.push(gap_episode(3));

    let (dataset, result) = compile(episodes, test_config(), dir.path());

    assert_eq!(result.episodes_written, 4);
    assert_eq!(result.episodes_invalid, 1);
    let flagged = dataset.query(&QueryFilter::all().invalid(true)).unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].episode_id, episode_id(3));
    assert_eq!(dataset.count(&QueryFilter::all().invalid(false)).unwrap(), 3);
}

#[test]
fn test_severity_override_rejects_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.validation.severity_overrides.insert("W020".into(), Severity::Error);
    let mut episodes = synthetic_episodes(3, 23);
    episodes.push(gap_episode(3));

    let (dataset, result) = compile(episodes, config, dir.path());

    assert_eq!(result.episodes_rejected, 1);
    assert_eq!(result.episodes_invalid, 0);
    assert_eq!(dataset.len(), 3);
}

#[test]
fn test_fail_fast_stops_at_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.validation.fail_fast = true;
    let mut episodes = synthetic_episodes(5, 24);
    episodes.insert(2, nan_action_episode(10));

    let (dataset, result) = compile(episodes, config, dir.path());

    assert!(result.aborted);
    assert!(!result.success);
    assert_eq!(result.report.total_episodes, 3);
    assert_eq!(ids(&dataset), vec![episode_id(0), episode_id(1)]);
    // The partial build is still sealed and verifiable
    assert_eq!(dataset.manifest().unwrap().status, RunStatus::Completed);
    dataset.verify().unwrap();
}

#[test]
fn test_strict_mode_stops_at_first_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.validation.strict = true;
    let mut episodes = synthetic_episodes(4, 25);
    episodes.insert(1, gap_episode(9));

    let (dataset, result) = compile(episodes, config, dir.path());

    assert!(result.aborted);
    assert_eq!(result.episodes_rejected, 1);
    assert_eq!(ids(&dataset), vec![episode_id(0)]);
}

#[test]
fn test_quarantine_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.validation.quarantine = true;
    let mut episodes = synthetic_episodes(3, 26);
    episodes.insert(1, nan_action_episode(10));
    episodes.push(gap_episode(11));

    let (dataset, result) = compile(episodes, config, dir.path());

    assert!(result.success);
    assert!(!result.aborted);
    assert_eq!(result.episodes_rejected, 1);
    assert_eq!(result.episodes_invalid, 1);
    assert_eq!(dataset.len(), 4);
    assert_eq!(result.report.quarantined, vec![episode_id(10), episode_id(11)]);

    let summary: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("reports/validation_summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        summary["quarantined_episodes"],
        serde_json::json!([episode_id(10), episode_id(11)])
    );
}

#[test]
fn test_collect_mode_quarantines_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut episodes = synthetic_episodes(2, 28);
    episodes.push(gap_episode(11));

    let (_dataset, result) = compile(episodes, test_config(), dir.path());

    assert_eq!(result.episodes_invalid, 1);
    assert!(result.report.quarantined.is_empty());
}

#[test]
fn test_validate_only_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut episodes = synthetic_episodes(3, 27);
    episodes.push(nan_action_episode(10));

    let mut compiler = Compiler::from_config(test_config()).unwrap();
    let report = compiler
        .validate_only(&mut adapter(episodes), "train", &Selector::all(), None)
        .unwrap();

    assert_eq!(report.total_episodes, 4);
    assert_eq!(report.error_episodes, 1);
    assert_eq!(report.valid_episodes, 3);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
