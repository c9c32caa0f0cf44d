//! Task text resolution.

use crate::chain::{Transform, TransformContext};
use datakit_core::{keys, Episode, Value};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Episode metadata keys searched for task text, in order.
pub const METADATA_TASK_KEYS: &[&str] = &["task", "instruction", "task_text", "language_instruction"];

/// Collapse runs of whitespace to one space and trim.
pub fn normalize_task_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves an episode's task text and registers it in the task catalog.
///
/// Sources, first non-empty wins: the episode's own `task_text`, the first
/// step's language observation, episode metadata (`task`, `instruction`,
/// `task_text`, `language_instruction`), then `default_text`. An episode
/// with no text anywhere keeps `task_id = None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskText {
    /// Fallback when no source has text
    pub default_text: String,
    /// Observation key holding the instruction
    pub language_key: String,
}

impl Default for TaskText {
    fn default() -> Self {
        TaskText {
            default_text: String::new(),
            language_key: keys::LANGUAGE_KEY.to_string(),
        }
    }
}

impl TaskText {
    fn extract(&self, episode: &Episode) -> Option<String> {
        let non_empty = |s: String| {
            let s = normalize_task_text(&s);
            (!s.is_empty()).then_some(s)
        };

        if let Some(text) = episode.task_text.clone().and_then(non_empty) {
            return Some(text);
        }
        let from_language = episode
            .steps
            .first()
            .and_then(|s| s.observation.get(&self.language_key))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
                _ => None,
            })
            .and_then(non_empty);
        if from_language.is_some() {
            return from_language;
        }
        METADATA_TASK_KEYS
            .iter()
            .filter_map(|k| episode.metadata.get(*k))
            .filter_map(|v| v.as_str().map(str::to_string))
            .find_map(non_empty)
    }
}

impl Transform for TaskText {
    fn name(&self) -> &str {
        "task_text"
    }

    fn apply(&self, mut episode: Episode, ctx: &mut TransformContext<'_>) -> Episode {
        let text = self
            .extract(&episode)
            .or_else(|| Some(normalize_task_text(&self.default_text)).filter(|s| !s.is_empty()));
        match text {
            Some(text) => {
                episode.task_id = Some(ctx.catalog.get_or_add(&text));
                episode.task_text = Some(text);
            }
            None => {
                warn!(episode_id = %episode.episode_id, "No task text found");
                episode.task_id = None;
                episode.task_text = None;
            }
        }
        episode
    }
}
