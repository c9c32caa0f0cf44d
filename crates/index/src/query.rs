//! Predicate queries over the episode index.
//!
//! A [`QueryFilter`] is a flat set of optional constraints. Every present
//! field must hold for a record to match; an absent field places no
//! constraint. The filter is compiled once into a [`CompiledFilter`] so the
//! task-text regex is parsed (and rejected) before any record is scanned.

use crate::error::{IndexError, Result};
use datakit_core::{ConfigError, EpisodeIndexRecord, Split};
use datakit_storage::{read_index, ArtifactLayout};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Conjunctive episode predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryFilter {
    /// Robot id is one of these
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_ids: Option<Vec<String>>,
    /// Task id is one of these
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ids: Option<Vec<u32>>,
    /// Case-insensitive regex searched in the task text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_text_regex: Option<String>,
    /// At least this many steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_steps: Option<u64>,
    /// At most this many steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    /// Every listed camera is in the episode's camera set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cameras: Option<Vec<String>>,
    /// Action-space type equals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_space_type: Option<String>,
    /// Invalid flag equals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<bool>,
    /// Split equals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
    /// Dataset name equals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
}

impl QueryFilter {
    /// Filter matching everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to robot ids
    pub fn robots<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.robot_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to task ids
    pub fn tasks(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.task_ids = Some(ids.into_iter().collect());
        self
    }

    /// Require a task-text match
    pub fn task_text(mut self, pattern: impl Into<String>) -> Self {
        self.task_text_regex = Some(pattern.into());
        self
    }

    /// Step-count bounds, inclusive
    pub fn steps(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_steps = min;
        self.max_steps = max;
        self
    }

    /// Require cameras
    pub fn with_cameras<S: Into<String>>(mut self, cameras: impl IntoIterator<Item = S>) -> Self {
        self.cameras = Some(cameras.into_iter().map(Into::into).collect());
        self
    }

    /// Require an action-space type
    pub fn action_space(mut self, space: impl Into<String>) -> Self {
        self.action_space_type = Some(space.into());
        self
    }

    /// Require the invalid flag
    pub fn invalid(mut self, invalid: bool) -> Self {
        self.invalid = Some(invalid);
        self
    }

    /// Require a split
    pub fn in_split(mut self, split: Split) -> Self {
        self.split = Some(split);
        self
    }

    /// Require a dataset name
    pub fn dataset(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    /// Validate and compile.
    pub fn compile(&self) -> std::result::Result<CompiledFilter, ConfigError> {
        CompiledFilter::new(self)
    }
}

/// A [`QueryFilter`] with its regex parsed.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    filter: QueryFilter,
    task_text: Option<Regex>,
}

impl CompiledFilter {
    /// Compile `filter`; an invalid regex is a [`ConfigError::InvalidRegex`].
    pub fn new(filter: &QueryFilter) -> std::result::Result<Self, ConfigError> {
        let task_text = match &filter.task_text_regex {
            Some(pattern) => Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidRegex {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?,
            ),
            None => None,
        };
        Ok(CompiledFilter {
            filter: filter.clone(),
            task_text,
        })
    }

    /// Source filter
    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    /// True when `record` satisfies every present constraint.
    pub fn matches(&self, record: &EpisodeIndexRecord) -> bool {
        let f = &self.filter;
        if let Some(ids) = &f.robot_ids {
            if !ids.iter().any(|id| *id == record.robot_id) {
                return false;
            }
        }
        if let Some(ids) = &f.task_ids {
            match record.task_id {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(re) = &self.task_text {
            if !re.is_match(record.task_text.as_deref().unwrap_or("")) {
                return false;
            }
        }
        if f.min_steps.is_some_and(|min| record.num_steps < min) {
            return false;
        }
        if f.max_steps.is_some_and(|max| record.num_steps > max) {
            return false;
        }
        if let Some(required) = &f.cameras {
            let present = record.cameras();
            if !required.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }
        if f.action_space_type.as_ref().is_some_and(|s| *s != record.action_space_type) {
            return false;
        }
        if f.invalid.is_some_and(|inv| inv != record.invalid) {
            return false;
        }
        if f.split.is_some_and(|s| s != record.split) {
            return false;
        }
        if f.dataset_name.as_ref().is_some_and(|n| *n != record.dataset_name) {
            return false;
        }
        true
    }
}

/// In-memory query engine over one index table.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    records: Vec<EpisodeIndexRecord>,
}

impl QueryEngine {
    /// Load the index of the dataset at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let layout = ArtifactLayout::new(root);
        let path = layout
            .find_index()
            .ok_or_else(|| IndexError::IndexNotFound(root.to_path_buf()))?;
        let records = read_index(&path)?;
        debug!(path = %path.display(), records = records.len(), "Loaded episode index");
        Ok(QueryEngine { records })
    }

    /// Engine over records already in memory
    pub fn from_records(records: Vec<EpisodeIndexRecord>) -> Self {
        QueryEngine { records }
    }

    /// Every record, in index order
    pub fn records(&self) -> &[EpisodeIndexRecord] {
        &self.records
    }

    /// Matching records, in index order.
    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<EpisodeIndexRecord>> {
        let compiled = filter.compile()?;
        Ok(self.select(&compiled).cloned().collect())
    }

    /// Matching episode ids.
    pub fn query_ids(&self, filter: &QueryFilter) -> Result<Vec<String>> {
        let compiled = filter.compile()?;
        Ok(self.select(&compiled).map(|r| r.episode_id.clone()).collect())
    }

    /// Number of matching records.
    pub fn count(&self, filter: &QueryFilter) -> Result<usize> {
        let compiled = filter.compile()?;
        Ok(self.select(&compiled).count())
    }

    /// Matching records for an already compiled filter
    pub fn select<'a>(&'a self, filter: &'a CompiledFilter) -> impl Iterator<Item = &'a EpisodeIndexRecord> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }
}
