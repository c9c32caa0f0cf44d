//! Steps and episodes.
//!
//! An [`Episode`] is an ordered run of [`Step`]s with identity and task
//! provenance. Both are plain values: transforms consume an episode and
//! return a new one rather than mutating shared state.
//!
//! ## Structural invariants
//!
//! | Invariant | Meaning |
//! |-----------|---------|
//! | First | exactly one `is_first`, at index 0 |
//! | Last | exactly one `is_last`, at the final index |
//! | Terminal action | the last step carries no action |
//! | Key set | every non-last step has the same observation keys |
//!
//! These are *checked* (see [`Episode::validate_structure`] and the RLDS
//! validator), never assumed, because sources routinely violate them.

use crate::error::Result;
use crate::keys;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Free-form metadata attached to steps and episodes
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One timestep of an episode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    /// First step of the episode
    pub is_first: bool,
    /// Last step of the episode
    pub is_last: bool,
    /// Episode ended in a terminal state (as opposed to truncation)
    pub is_terminal: bool,
    /// Dotted key -> value
    pub observation: BTreeMap<String, Value>,
    /// Action taken at this step; absent on the last step
    pub action: Option<Vec<f32>>,
    /// Scalar reward
    pub reward: Option<f64>,
    /// Discount factor
    pub discount: Option<f64>,
    /// Seconds since episode start; `None` when the source had none
    pub timestamp: Option<f64>,
    /// Source-specific extras
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Step {
    /// Step with the given observation and no flags set.
    pub fn new(observation: BTreeMap<String, Value>) -> Self {
        Step {
            observation,
            ..Default::default()
        }
    }

    /// Set the action
    pub fn with_action(mut self, action: Vec<f32>) -> Self {
        self.action = Some(action);
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the reward
    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = Some(reward);
        self
    }

    /// Set first/last/terminal flags
    pub fn with_flags(mut self, is_first: bool, is_last: bool, is_terminal: bool) -> Self {
        self.is_first = is_first;
        self.is_last = is_last;
        self.is_terminal = is_terminal;
        self
    }

    /// Insert an observation entry
    pub fn with_observation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.observation.insert(key.into(), value.into());
        self
    }

    /// Observation keys in sorted order
    pub fn observation_keys(&self) -> BTreeSet<&str> {
        self.observation.keys().map(String::as_str).collect()
    }
}

/// An ordered sequence of steps with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Stable identifier, unique within a dataset
    pub episode_id: String,
    /// Source dataset identifier
    pub dataset_id: String,
    /// Steps in time order
    pub steps: Vec<Step>,
    /// Task catalog id, assigned by task-text resolution
    #[serde(default)]
    pub task_id: Option<u32>,
    /// Natural-language task description
    #[serde(default)]
    pub task_text: Option<String>,
    /// Written but flagged by validation
    #[serde(default)]
    pub invalid: bool,
    /// Source-specific extras (`robot_id`, original task fields, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Episode {
    /// New episode with no task and no metadata.
    pub fn new(episode_id: impl Into<String>, dataset_id: impl Into<String>, steps: Vec<Step>) -> Self {
        Episode {
            episode_id: episode_id.into(),
            dataset_id: dataset_id.into(),
            steps,
            task_id: None,
            task_text: None,
            invalid: false,
            metadata: Metadata::new(),
        }
    }

    /// Same identity and provenance, different steps.
    pub fn with_steps(self, steps: Vec<Step>) -> Self {
        Episode { steps, ..self }
    }

    /// Number of steps
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// True when the episode has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Timestamp of the first step, if present
    pub fn start_timestamp(&self) -> Option<f64> {
        self.steps.first().and_then(|s| s.timestamp)
    }

    /// Timestamp of the last step, if present
    pub fn end_timestamp(&self) -> Option<f64> {
        self.steps.last().and_then(|s| s.timestamp)
    }

    /// Seconds between first and last step; zero when either is missing.
    pub fn duration(&self) -> f64 {
        match (self.start_timestamp(), self.end_timestamp()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }

    /// Sorted camera names from the first step's image keys.
    pub fn camera_names(&self) -> Vec<String> {
        let Some(first) = self.steps.first() else {
            return Vec::new();
        };
        first
            .observation
            .keys()
            .filter(|k| keys::is_image_key(k))
            .filter_map(|k| keys::camera_name(k))
            .map(str::to_string)
            .collect()
    }

    /// Actions of every step that has one.
    pub fn actions(&self) -> impl Iterator<Item = &[f32]> {
        self.steps.iter().filter_map(|s| s.action.as_deref())
    }

    /// `metadata.robot_id` as a string, or `"unknown"`.
    pub fn robot_id(&self) -> String {
        match self.metadata.get("robot_id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => "unknown".to_string(),
        }
    }

    /// Check the structural invariants. Returns one message per violation;
    /// empty when the episode is well-formed.
    pub fn validate_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let n = self.steps.len();
        if n == 0 {
            errors.push("episode has no steps".to_string());
            return errors;
        }

        if !self.steps[0].is_first {
            errors.push("first step is not marked is_first".to_string());
        }
        if !self.steps[n - 1].is_last {
            errors.push("last step is not marked is_last".to_string());
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.is_first && i != 0 {
                errors.push(format!("step {} marked is_first", i));
            }
            if step.is_last && i != n - 1 {
                errors.push(format!("step {} marked is_last", i));
            }
        }
        if self.steps[n - 1].action.is_some() {
            errors.push("last step carries an action".to_string());
        }

        let mut reference: Option<BTreeSet<&str>> = None;
        for (i, step) in self.steps.iter().enumerate().take(n.saturating_sub(1)) {
            let keys = step.observation_keys();
            match &reference {
                None => reference = Some(keys),
                Some(expected) if *expected != keys => {
                    errors.push(format!("step {} observation keys differ from step 0", i));
                }
                Some(_) => {}
            }
        }
        errors
    }

    /// Serialize to JSON (the dict form used by JSONL sources).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON dict form.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Tensor;

    fn well_formed(n: usize) -> Episode {
        let steps = (0..n)
            .map(|i| {
                let step = Step::new(BTreeMap::new())
                    .with_observation("observation.images.front", Tensor::rgb(2, 2))
                    .with_observation("observation.state", Tensor::vector(vec![0.0; 3]))
                    .with_timestamp(i as f64 * 0.1)
                    .with_flags(i == 0, i == n - 1, i == n - 1);
                if i == n - 1 {
                    step
                } else {
                    step.with_action(vec![0.1; 7])
                }
            })
            .collect();
        Episode::new("ep_0", "ds", steps)
    }

    #[test]
    fn test_well_formed_has_no_structure_errors() {
        assert!(well_formed(5).validate_structure().is_empty());
    }

    #[test]
    fn test_structure_errors_reported() {
        let mut ep = well_formed(4);
        ep.steps[0].is_first = false;
        ep.steps[2].is_last = true;
        ep.steps[3].action = Some(vec![1.0]);
        let errors = ep.validate_structure();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_empty_episode() {
        let ep = Episode::new("e", "d", Vec::new());
        assert_eq!(ep.validate_structure(), vec!["episode has no steps".to_string()]);
        assert_eq!(ep.duration(), 0.0);
        assert!(ep.camera_names().is_empty());
    }

    #[test]
    fn test_duration_and_cameras() {
        let ep = well_formed(5);
        assert!((ep.duration() - 0.4).abs() < 1e-9);
        assert_eq!(ep.camera_names(), vec!["front".to_string()]);
    }

    #[test]
    fn test_robot_id_default() {
        let mut ep = well_formed(2);
        assert_eq!(ep.robot_id(), "unknown");
        ep.metadata.insert("robot_id".into(), serde_json::json!("franka"));
        assert_eq!(ep.robot_id(), "franka");
    }

    #[test]
    fn test_json_round_trip_preserves_episode() {
        let mut ep = well_formed(3);
        ep.task_id = Some(4);
        ep.task_text = Some("pick up the cube".into());
        ep.steps[0].metadata.insert("source_frame".into(), serde_json::json!(17));
        let back = Episode::from_json(&ep.to_json().unwrap()).unwrap();
        assert_eq!(back, ep);
    }
}
