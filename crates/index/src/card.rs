//! Dataset cards.
//!
//! A [`DatasetCard`] summarizes a compiled root as a markdown README with
//! YAML front matter, ready for a dataset hub. It is assembled from:
//!
//! | Source | Card fields |
//! |--------|-------------|
//! | episode index (required) | robots, cameras, split counts, fallback totals |
//! | `meta/info.json` | episode/frame totals, control rate, action dimension |
//! | `meta/tasks.jsonl` | task list (falls back to the index's task texts) |
//! | `meta/stats.json` | per-dimension action statistics |
//!
//! Optional files that are missing leave their sections out, so cards can
//! be generated for view slices too.

use crate::error::{IndexError, Result};
use crate::query::QueryEngine;
use datakit_core::stats::ACTION_KEY;
use datakit_core::{DatasetStats, FeatureStats, TaskCatalog};
use datakit_storage::{ArtifactLayout, DatasetInfo, StorageError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Card file name at the dataset root
pub const CARD_FILE: &str = "README.md";

/// Tasks listed before the list is truncated
pub const MAX_CARD_TASKS: usize = 10;

const DEFAULT_DESCRIPTION: &str = "A compiled robot trajectory dataset.";

/// Summary of a compiled dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetCard {
    /// Title
    pub name: String,
    /// Free-text description
    pub description: Option<String>,
    /// License identifier for the front matter
    pub license: String,
    /// Episodes in the dataset
    pub num_episodes: u64,
    /// Frames in the dataset
    pub num_frames: u64,
    /// Control frequency in Hz
    pub control_rate_hz: Option<f64>,
    /// Action vector length
    pub action_dim: Option<usize>,
    /// Distinct robot ids, sorted
    pub robot_types: Vec<String>,
    /// First [`MAX_CARD_TASKS`] tasks in catalog order
    pub tasks: Vec<String>,
    /// Distinct tasks overall
    pub total_tasks: usize,
    /// Distinct cameras, sorted
    pub cameras: Vec<String>,
    /// Split name -> episodes
    pub splits: BTreeMap<String, u64>,
    /// Action statistics from `stats.json`
    pub action_stats: Option<FeatureStats>,
}

impl DatasetCard {
    /// Card with only a title.
    pub fn new(name: impl Into<String>) -> Self {
        DatasetCard {
            name: name.into(),
            description: None,
            license: "proprietary".to_string(),
            num_episodes: 0,
            num_frames: 0,
            control_rate_hz: None,
            action_dim: None,
            robot_types: Vec::new(),
            tasks: Vec::new(),
            total_tasks: 0,
            cameras: Vec::new(),
            splits: BTreeMap::new(),
            action_stats: None,
        }
    }

    /// Build the card for the dataset at `root`.
    pub fn from_dataset(root: &Path, name: impl Into<String>) -> Result<Self> {
        let layout = ArtifactLayout::new(root);
        let engine = QueryEngine::open(root)?;
        let records = engine.records();
        let mut card = DatasetCard::new(name);

        card.num_episodes = records.len() as u64;
        card.num_frames = records.iter().map(|r| r.num_rows()).sum();
        card.robot_types = records
            .iter()
            .map(|r| r.robot_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        card.cameras = records
            .iter()
            .flat_map(|r| r.cameras())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for r in records {
            *card.splits.entry(r.split.as_str().to_string()).or_default() += 1;
        }

        let info_path = layout.info_path();
        if info_path.is_file() {
            let info = DatasetInfo::load(&info_path)?;
            card.num_episodes = info.total_episodes;
            card.num_frames = info.total_frames;
            card.control_rate_hz = Some(info.fps);
            card.action_dim = info
                .features
                .get(ACTION_KEY)
                .and_then(|f| f.shape.first().copied());
        }

        let tasks_path = layout.tasks_path();
        let tasks: Vec<String> = if tasks_path.is_file() {
            let catalog =
                TaskCatalog::from_jsonl(&fs::read_to_string(&tasks_path)?).map_err(StorageError::from)?;
            catalog.iter().map(|(_, text)| text.to_string()).collect()
        } else {
            let mut seen = BTreeSet::new();
            records
                .iter()
                .filter_map(|r| r.task_text.clone())
                .filter(|t| seen.insert(t.clone()))
                .collect()
        };
        card.total_tasks = tasks.len();
        card.tasks = tasks.into_iter().take(MAX_CARD_TASKS).collect();

        let stats_path = layout.stats_path();
        if stats_path.is_file() {
            let mut stats: DatasetStats = serde_json::from_str(&fs::read_to_string(&stats_path)?)?;
            card.action_stats = stats.remove(ACTION_KEY);
            if card.action_dim.is_none() {
                card.action_dim = card.action_stats.as_ref().map(|s| s.mean.len());
            }
        }

        debug!(root = %root.display(), episodes = card.num_episodes, "Built dataset card");
        Ok(card)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the license
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = license.into();
        self
    }

    /// Render as markdown with YAML front matter.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        // writing into a String cannot fail
        let _ = self.render(&mut md);
        md
    }

    fn render(&self, md: &mut String) -> std::fmt::Result {
        writeln!(md, "---")?;
        writeln!(md, "license: {}", self.license)?;
        writeln!(md, "task_categories:\n  - robotics")?;
        writeln!(md, "tags:\n  - embodied-ai\n  - robot-learning")?;
        writeln!(md, "---\n")?;

        writeln!(md, "# {}\n", self.name)?;
        writeln!(md, "{}\n", self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION))?;

        writeln!(md, "## Dataset Summary\n")?;
        writeln!(md, "- **Episodes**: {}", thousands(self.num_episodes))?;
        writeln!(md, "- **Frames**: {}", thousands(self.num_frames))?;
        if let Some(rate) = self.control_rate_hz {
            writeln!(md, "- **Control Rate**: {rate} Hz")?;
        }
        if let Some(dim) = self.action_dim {
            writeln!(md, "- **Action Dimension**: {dim}")?;
        }
        writeln!(md)?;

        if !self.splits.is_empty() {
            writeln!(md, "## Splits\n")?;
            writeln!(md, "| Split | Episodes |\n|-------|----------|")?;
            for (split, count) in &self.splits {
                writeln!(md, "| {split} | {} |", thousands(*count))?;
            }
            writeln!(md)?;
        }

        list_section(md, "Robot Types", &self.robot_types)?;
        list_section(md, "Tasks", &self.tasks)?;
        if self.total_tasks > self.tasks.len() {
            writeln!(md, "...and {} more.\n", self.total_tasks - self.tasks.len())?;
        }
        list_section(md, "Cameras", &self.cameras)?;

        if let Some(stats) = &self.action_stats {
            writeln!(md, "## Action Statistics\n")?;
            writeln!(md, "| Dim | Mean | Std | Min | Max |\n|-----|------|-----|-----|-----|")?;
            for (i, mean) in stats.mean.iter().enumerate() {
                writeln!(
                    md,
                    "| {i} | {mean:.4} | {:.4} | {:.4} | {:.4} |",
                    component(&stats.std, i),
                    component(&stats.min, i),
                    component(&stats.max, i)
                )?;
            }
            writeln!(md)?;
        }
        Ok(())
    }

    /// Write the markdown to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_markdown()).map_err(IndexError::from)
    }
}

fn list_section(md: &mut String, title: &str, items: &[String]) -> std::fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(md, "## {title}\n")?;
    for item in items {
        writeln!(md, "- {item}")?;
    }
    writeln!(md)
}

fn component(values: &[f64], i: usize) -> f64 {
    values.get(i).copied().unwrap_or(f64::NAN)
}

/// `1234567` -> `1,234,567`
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
