//! Compiled dataset handle.
//!
//! This module provides [`Dataset`], the entry point for working with a
//! compiled dataset root, and [`DatasetBuilder`], which compiles one.

use crate::error::{Error, Result};
use datakit_core::EpisodeIndexRecord;
use datakit_durability::{verify_checksums, RunManifest};
use datakit_engine::{Adapter, CompileResult, Compiler, Config, PipelineSpec, Registry, Selector};
use datakit_index::{DatasetCard, QueryEngine, QueryFilter, SliceManifest, SliceMaterializer, SliceMode, CARD_FILE};
use datakit_storage::{ArtifactLayout, DatasetInfo, EncoderFactory, LeRobotV3Writer, RawFrameEncoderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A compiled dataset.
///
/// Holds the dataset metadata, the run manifest (when the root was produced
/// by a build rather than sliced) and the episode index in memory.
///
/// # Example
///
/// ```ignore
/// use datakit::prelude::*;
///
/// let ds = Dataset::open("./out")?;
/// ds.verify()?;
/// let franka = ds.query(&QueryFilter::all().robots(["franka"]))?;
/// ds.slice(&QueryFilter::all().in_split(Split::Val), "./val", SliceMode::View, "val")?;
/// ```
#[derive(Debug)]
pub struct Dataset {
    root: PathBuf,
    info: Option<DatasetInfo>,
    manifest: Option<RunManifest>,
    index: QueryEngine,
}

impl Dataset {
    /// Open the dataset at `root`.
    ///
    /// Only the episode index is required; slices in view mode carry no
    /// `info.json` of their own.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NotFound(format!("dataset root {}", root.display())));
        }
        let layout = ArtifactLayout::new(root);
        let info = match layout.info_path() {
            p if p.is_file() => Some(DatasetInfo::load(&p)?),
            _ => None,
        };
        let manifest = match layout.manifest_path() {
            p if p.is_file() => Some(RunManifest::load(&p)?),
            _ => None,
        };
        let index = QueryEngine::open(root)?;
        Ok(Dataset {
            root: root.to_path_buf(),
            info,
            manifest,
            index,
        })
    }

    /// Create a builder that compiles a new dataset.
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    /// Dataset root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Contents of `meta/info.json`
    pub fn info(&self) -> Option<&DatasetInfo> {
        self.info.as_ref()
    }

    /// Run manifest
    pub fn manifest(&self) -> Option<&RunManifest> {
        self.manifest.as_ref()
    }

    /// Build id from the manifest
    pub fn build_id(&self) -> Option<&str> {
        self.manifest.as_ref().map(|m| m.build_id.as_str())
    }

    /// Episodes in the index
    pub fn len(&self) -> usize {
        self.index.records().len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.records().is_empty()
    }

    /// Every index record, in episode order
    pub fn records(&self) -> &[EpisodeIndexRecord] {
        self.index.records()
    }

    /// Records matching `filter`
    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<EpisodeIndexRecord>> {
        Ok(self.index.query(filter)?)
    }

    /// Number of records matching `filter`
    pub fn count(&self, filter: &QueryFilter) -> Result<usize> {
        Ok(self.index.count(filter)?)
    }

    /// Materialize the episodes matching `filter` under `output`.
    pub fn slice(
        &self,
        filter: &QueryFilter,
        output: impl AsRef<Path>,
        mode: SliceMode,
        slice_id: &str,
    ) -> Result<SliceManifest> {
        let materializer = SliceMaterializer::new(&self.root, output.as_ref(), mode);
        Ok(materializer.materialize(filter, slice_id, self.build_id())?)
    }

    /// Dataset card built from the metadata and index of this root.
    ///
    /// The title is the dataset name recorded in the index, or the root's
    /// directory name for an empty index.
    pub fn card(&self) -> Result<DatasetCard> {
        let name = match self.records().first() {
            Some(record) => record.dataset_name.clone(),
            None => self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        Ok(DatasetCard::from_dataset(&self.root, name)?)
    }

    /// Write the dataset card to `README.md` at the root.
    pub fn write_card(&self) -> Result<PathBuf> {
        let path = self.root.join(CARD_FILE);
        self.card()?.save(&path)?;
        info!(path = %path.display(), "Dataset card written");
        Ok(path)
    }

    /// Re-hash every file listed in `meta/checksums.json`.
    ///
    /// Returns [`Error::Verification`] listing every missing or modified
    /// file.
    pub fn verify(&self) -> Result<()> {
        let problems = verify_checksums(&self.root)?;
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Verification(problems))
        }
    }
}

/// Builder for a compilation run.
///
/// # Example
///
/// ```ignore
/// let (dataset, result) = Dataset::builder()
///     .config(config)
///     .selector(Selector::parse("[0:100]")?)
///     .compile(&mut JsonlAdapter::new("./source"), "./out")?;
/// ```
pub struct DatasetBuilder {
    config: Config,
    pipeline: Option<PipelineSpec>,
    registry: Registry,
    split: String,
    selector: Selector,
    encoder: Option<Arc<dyn EncoderFactory>>,
}

impl DatasetBuilder {
    /// Builder with the default configuration and pipeline.
    pub fn new() -> Self {
        DatasetBuilder {
            config: Config::default(),
            pipeline: None,
            registry: Registry::new(),
            split: "train".to_string(),
            selector: Selector::all(),
            encoder: None,
        }
    }

    /// Use `config`; per-dataset overrides are applied after probing
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use explicit stages instead of the ones derived from the config
    pub fn pipeline(mut self, pipeline: PipelineSpec) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Resolve stage names against `registry`
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Source split to compile
    pub fn split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    /// Restrict the source stream
    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Encode video with `encoder` instead of ffmpeg
    pub fn encoder(mut self, encoder: Arc<dyn EncoderFactory>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Store raw rgb24 frames; no external encoder needed
    pub fn raw_video(self) -> Self {
        self.encoder(Arc::new(RawFrameEncoderFactory))
    }

    /// Compile `adapter` into `output` and open the result.
    pub fn compile(self, adapter: &mut dyn Adapter, output: impl AsRef<Path>) -> Result<(Dataset, CompileResult)> {
        let output = output.as_ref();
        let name = adapter.probe().map_err(Error::from)?.dataset_name;
        let config = self.config.for_dataset(&name)?;
        let pipeline = match self.pipeline {
            Some(p) => p,
            None => PipelineSpec::from_config(&config),
        };
        let encoder: Arc<dyn EncoderFactory> = match self.encoder {
            Some(e) => e,
            None => Arc::new(config.encoder()),
        };
        let mut writer = LeRobotV3Writer::with_encoder(config.writer_options(), encoder);
        let mut compiler = Compiler::from_pipeline(config, &pipeline, &self.registry)?
            .with_split(self.split)
            .with_selector(self.selector);

        let result = compiler.compile(adapter, &mut writer, output)?;
        info!(build_id = %result.build_id(), written = result.episodes_written, "Dataset compiled");
        let dataset = Dataset::open(output)?;
        Ok((dataset, result))
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}
