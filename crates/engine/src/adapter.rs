//! Episode sources.
//!
//! An [`Adapter`] describes a source dataset ([`Adapter::probe`]) and
//! streams its episodes in source order ([`Adapter::iter_episodes`]). A
//! [`Selector`] restricts the stream to a half-open position range.
//!
//! Two sources ship with the engine:
//!
//! - [`InMemoryAdapter`]: episodes held in memory, per split
//! - [`JsonlAdapter`]: a directory with one `<split>.jsonl` file per split,
//!   each line an episode in its serialized form, and an optional
//!   `spec.json`

use crate::error::{AdapterError, AdapterResult};
use datakit_core::{ConfigError, DatasetSpec, Episode};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Stream of decoded episodes.
pub type EpisodeStream<'a> = Box<dyn Iterator<Item = AdapterResult<Episode>> + 'a>;

/// A source of episodes.
pub trait Adapter: Send {
    /// Describe the dataset.
    fn probe(&mut self) -> AdapterResult<DatasetSpec>;

    /// Episodes of `split` within `selector`, in source order.
    fn iter_episodes(&mut self, split: &str, selector: &Selector) -> AdapterResult<EpisodeStream<'_>>;

    /// Release held resources.
    fn close(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Half-open range of episode positions, `"[start:end]"` with either bound
/// optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selector {
    /// First position, inclusive
    pub start: Option<usize>,
    /// Last position, exclusive
    pub end: Option<usize>,
}

impl Selector {
    /// Everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Positions `start..end`
    pub fn range(start: usize, end: usize) -> Self {
        Selector {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse `"[start:end]"`. Brackets are optional, the empty string
    /// selects everything. Negative or inverted bounds are rejected.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::all());
        }
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(trimmed);
        let invalid = || ConfigError::InvalidSelector(s.to_string());

        let (a, b) = inner.split_once(':').ok_or_else(invalid)?;
        if b.contains(':') {
            return Err(invalid());
        }
        let bound = |part: &str| -> Result<Option<usize>, ConfigError> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse::<usize>().map(Some).map_err(|_| invalid())
            }
        };
        let selector = Selector {
            start: bound(a)?,
            end: bound(b)?,
        };
        if let (Some(start), Some(end)) = (selector.start, selector.end) {
            if end < start {
                return Err(invalid());
            }
        }
        Ok(selector)
    }

    /// True when `position` is selected
    pub fn contains(&self, position: usize) -> bool {
        self.start.map_or(true, |s| position >= s) && self.end.map_or(true, |e| position < e)
    }

    /// Restrict `iter` to the selected positions.
    pub fn apply<'a, I>(&self, iter: I) -> Box<dyn Iterator<Item = I::Item> + 'a>
    where
        I: Iterator + 'a,
    {
        let start = self.start.unwrap_or(0);
        let skipped = iter.skip(start);
        match self.end {
            Some(end) => Box::new(skipped.take(end.saturating_sub(start))),
            None => Box::new(skipped),
        }
    }
}

impl FromStr for Selector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<usize>| b.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "[{}:{}]", bound(self.start), bound(self.end))
    }
}

// ============================================================================
// InMemoryAdapter
// ============================================================================

/// Episodes held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryAdapter {
    spec: DatasetSpec,
    splits: BTreeMap<String, Vec<Episode>>,
}

impl InMemoryAdapter {
    /// Source whose `train` split holds `episodes`.
    pub fn new(spec: DatasetSpec, episodes: Vec<Episode>) -> Self {
        let mut splits = BTreeMap::new();
        splits.insert("train".to_string(), episodes);
        InMemoryAdapter { spec, splits }
    }

    /// Add or replace a split
    pub fn with_split(mut self, split: impl Into<String>, episodes: Vec<Episode>) -> Self {
        self.splits.insert(split.into(), episodes);
        self
    }
}

impl Adapter for InMemoryAdapter {
    fn probe(&mut self) -> AdapterResult<DatasetSpec> {
        Ok(self.spec.clone())
    }

    fn iter_episodes(&mut self, split: &str, selector: &Selector) -> AdapterResult<EpisodeStream<'_>> {
        let episodes = self
            .splits
            .get(split)
            .ok_or_else(|| AdapterError::UnknownSplit(split.to_string()))?;
        Ok(selector.apply(episodes.iter().cloned().map(AdapterResult::Ok)))
    }
}

// ============================================================================
// JsonlAdapter
// ============================================================================

/// Spec file read by [`JsonlAdapter::probe`] when present.
pub const SPEC_FILE: &str = "spec.json";

/// Episodes stored as JSON lines, one file per split.
///
/// Blank lines are skipped. Without `spec.json` the spec is named after the
/// directory and its schema is inferred from the first `train` episode.
#[derive(Debug, Clone)]
pub struct JsonlAdapter {
    root: PathBuf,
}

impl JsonlAdapter {
    /// Source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonlAdapter { root: root.into() }
    }

    /// File holding `split`
    pub fn split_path(&self, split: &str) -> PathBuf {
        self.root.join(format!("{split}.jsonl"))
    }

    fn open(&self, split: &str) -> AdapterResult<(PathBuf, File)> {
        let path = self.split_path(split);
        if !path.is_file() {
            return Err(AdapterError::UnknownSplit(split.to_string()));
        }
        let file = File::open(&path)?;
        Ok((path, file))
    }

    fn read(path: PathBuf, file: File) -> impl Iterator<Item = AdapterResult<Episode>> {
        BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(i, line)| match line {
                Err(e) => Some(Err(AdapterError::Io(e))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Episode::from_json(&line).map_err(|e| AdapterError::Parse {
                    path: path.clone(),
                    line: i + 1,
                    reason: e.to_string(),
                })),
            })
    }

    /// Write `episodes` as `<root>/<split>.jsonl`, one per line.
    pub fn write_split(root: &Path, split: &str, episodes: &[Episode]) -> AdapterResult<PathBuf> {
        fs::create_dir_all(root)?;
        let mut body = String::new();
        for episode in episodes {
            let line = episode.to_json().map_err(|e| AdapterError::Parse {
                path: root.to_path_buf(),
                line: 0,
                reason: e.to_string(),
            })?;
            body.push_str(&line);
            body.push('\n');
        }
        let path = root.join(format!("{split}.jsonl"));
        fs::write(&path, body)?;
        Ok(path)
    }
}

impl Adapter for JsonlAdapter {
    fn probe(&mut self) -> AdapterResult<DatasetSpec> {
        let spec_path = self.root.join(SPEC_FILE);
        let uri = self.root.to_string_lossy().into_owned();
        if spec_path.is_file() {
            let mut spec: DatasetSpec =
                serde_json::from_str(&fs::read_to_string(&spec_path)?).map_err(|e| AdapterError::Parse {
                    path: spec_path.clone(),
                    line: 1,
                    reason: e.to_string(),
                })?;
            if spec.source_uri.is_empty() {
                spec.source_uri = uri;
            }
            return Ok(spec);
        }

        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jsonl".to_string());
        let mut spec = DatasetSpec::new(name.clone(), name);
        spec.source_uri = uri;
        if let Ok((path, file)) = self.open("train") {
            if let Some(first) = Self::read(path, file).next() {
                spec.infer_schema(&first?);
            }
        }
        debug!(root = %self.root.display(), features = spec.observation_schema.len(), "Probed JSONL source");
        Ok(spec)
    }

    fn iter_episodes(&mut self, split: &str, selector: &Selector) -> AdapterResult<EpisodeStream<'_>> {
        let (path, file) = self.open(split)?;
        Ok(selector.apply(Self::read(path, file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_core::{Step, Tensor};

    fn episode(id: &str) -> Episode {
        let steps = (0..2)
            .map(|i| {
                Step::new(BTreeMap::new())
                    .with_observation("observation.state", Tensor::vector(vec![i as f32]))
                    .with_flags(i == 0, i == 1, i == 1)
                    .with_timestamp(i as f64 * 0.1)
            })
            .collect();
        Episode::new(id, "demo", steps)
    }

    fn ids(stream: EpisodeStream<'_>) -> Vec<String> {
        stream.map(|e| e.unwrap().episode_id).collect()
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(Selector::parse("").unwrap(), Selector::all());
        assert_eq!(Selector::parse("[0:100]").unwrap(), Selector::range(0, 100));
        assert_eq!(
            Selector::parse("[40:]").unwrap(),
            Selector {
                start: Some(40),
                end: None
            }
        );
        assert_eq!(
            Selector::parse(":5").unwrap(),
            Selector {
                start: None,
                end: Some(5)
            }
        );
        assert_eq!(Selector::range(3, 4).to_string(), "[3:4]");
    }

    #[test]
    fn test_selector_rejects_garbage() {
        for bad in ["[1]", "[a:b]", "[-1:3]", "[5:2]", "[1:2:3]"] {
            assert_eq!(
                Selector::parse(bad),
                Err(ConfigError::InvalidSelector(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_selector_apply() {
        let s = Selector::range(1, 3);
        let picked: Vec<i32> = s.apply(0..10).collect();
        assert_eq!(picked, vec![1, 2]);
        assert!(s.contains(2) && !s.contains(3));
        let tail: Vec<i32> = Selector::parse("[8:]").unwrap().apply(0..10).collect();
        assert_eq!(tail, vec![8, 9]);
    }

    #[test]
    fn test_in_memory_splits() {
        let mut a = InMemoryAdapter::new(DatasetSpec::new("d", "d"), vec![episode("a"), episode("b")])
            .with_split("val", vec![episode("c")]);
        assert_eq!(ids(a.iter_episodes("train", &Selector::parse("[1:]").unwrap()).unwrap()), vec!["b"]);
        assert_eq!(ids(a.iter_episodes("val", &Selector::all()).unwrap()), vec!["c"]);
        assert!(matches!(
            a.iter_episodes("test", &Selector::all()),
            Err(AdapterError::UnknownSplit(_))
        ));
    }

    #[test]
    fn test_jsonl_round_trip_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("demo_set");
        JsonlAdapter::write_split(&root, "train", &[episode("a"), episode("b"), episode("c")]).unwrap();

        let mut adapter = JsonlAdapter::new(&root);
        let spec = adapter.probe().unwrap();
        assert_eq!(spec.dataset_name, "demo_set");
        assert!(spec.observation_schema.contains_key("observation.state"));

        let got = ids(adapter.iter_episodes("train", &Selector::range(0, 2)).unwrap());
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn test_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let line = episode("a").to_json().unwrap();
        fs::write(dir.path().join("train.jsonl"), format!("{line}\n\nnot json\n")).unwrap();

        let mut adapter = JsonlAdapter::new(dir.path());
        let results: Vec<_> = adapter.iter_episodes("train", &Selector::all()).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(AdapterError::Parse { line, .. }) => assert_eq!(*line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
