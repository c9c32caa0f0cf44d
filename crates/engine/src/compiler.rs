//! The compilation pipeline.
//!
//! ## Design
//!
//! One [`Compiler::compile`] call is one build. Episodes are pulled from the
//! adapter one at a time and each is fully transformed, validated and
//! written before the next is read.
//!
//! ```text
//! probe ─► manifest(running) ─► for each episode:
//!                                  transform chain
//!                                  validation runner ─► Rejected: count, skip
//!                                                   └─► Valid / Invalid: write
//!                               writer.finalize ─► reports ─► Finalizer ─► manifest(completed)
//! ```
//!
//! | Event | Episodes after it | Writer | Manifest |
//! |-------|-------------------|--------|----------|
//! | source exhausted | - | finalized | completed (or failed on offset violations) |
//! | fail-fast abort | not read | finalized | completed, `success = false` |
//! | cancel | not read | finalized | failed, cause `cancelled` |
//! | source / writer / finalize error | not read | abandoned | failed, error returned |
//!
//! The writer is started lazily with the first accepted episode, after its
//! features have been merged into the spec, so features added by transforms
//! reach the columnar schema.

use crate::adapter::{Adapter, Selector};
use crate::config::Config;
use crate::error::Result;
use crate::registry::{PipelineSpec, Registry};
use datakit_core::{ConfigError, DatasetSpec};
use datakit_durability::{Finalizer, RunManifest};
use datakit_storage::{relative_path, ArtifactLayout, EpisodeWriter};
use datakit_transform::{Transform, TransformChain};
use datakit_validate::{ReportWriter, ValidationReport, ValidationRunner, Validator, Verdict};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, error, info, info_span, warn};

/// Default interval, in episodes, between progress log lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Cooperative cancellation flag.
///
/// Clones share the flag. The compiler checks it before reading each
/// episode; once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Fresh, uncancelled handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one build.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Manifest sealed as completed and the run was not aborted
    pub success: bool,
    /// Dataset root
    pub output_dir: PathBuf,
    /// Spec as enriched during the run
    pub spec: DatasetSpec,
    /// Validation results of every consumed episode
    pub report: ValidationReport,
    /// Produced files, root-relative
    pub artifacts: Vec<String>,
    /// Episodes written, valid or invalid
    pub episodes_written: u64,
    /// Episodes with at least one ERROR
    pub episodes_rejected: u64,
    /// Written episodes flagged invalid
    pub episodes_invalid: u64,
    /// Rows written
    pub total_frames: u64,
    /// Fail-fast stopped the run early
    pub aborted: bool,
    /// The run was cancelled
    pub cancelled: bool,
    /// Sealed manifest
    pub manifest: RunManifest,
}

impl CompileResult {
    /// Build id of the run
    pub fn build_id(&self) -> &str {
        &self.manifest.build_id
    }
}

#[derive(Debug, Default)]
struct Tally {
    seen: u64,
    written: u64,
    rejected: u64,
    invalid: u64,
    aborted: bool,
    cancelled: bool,
}

/// Runs adapters through the transform chain, validators and a writer.
pub struct Compiler {
    config: Config,
    chain: TransformChain,
    runner: ValidationRunner,
    split: String,
    selector: Selector,
    progress_every: u64,
    cancel: CancelHandle,
}

impl Compiler {
    /// Compiler with an empty pipeline.
    pub fn new(config: Config) -> Self {
        let runner = ValidationRunner::new(config.runner_options());
        Compiler {
            config,
            chain: TransformChain::new(),
            runner,
            split: "train".to_string(),
            selector: Selector::all(),
            progress_every: DEFAULT_PROGRESS_EVERY,
            cancel: CancelHandle::new(),
        }
    }

    /// Compiler with the default pipeline of `config`.
    pub fn from_config(config: Config) -> std::result::Result<Self, ConfigError> {
        let pipeline = PipelineSpec::from_config(&config);
        Self::from_pipeline(config, &pipeline, &Registry::new())
    }

    /// Compiler with the stages of `pipeline`.
    pub fn from_pipeline(
        config: Config,
        pipeline: &PipelineSpec,
        registry: &Registry,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let chain = registry.build_chain(pipeline)?;
        let runner = registry.build_runner(pipeline, config.runner_options())?;
        Ok(Compiler {
            chain,
            runner,
            ..Self::new(config)
        })
    }

    /// Append a transform
    pub fn add_transform(&mut self, transform: Box<dyn Transform>) -> &mut Self {
        self.chain.add(transform);
        self
    }

    /// Builder form of [`add_transform`](Self::add_transform)
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.chain.add(Box::new(transform));
        self
    }

    /// Append a validator
    pub fn add_validator(&mut self, validator: Box<dyn Validator>) -> &mut Self {
        self.runner.add(validator);
        self
    }

    /// Builder form of [`add_validator`](Self::add_validator)
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.runner.add(Box::new(validator));
        self
    }

    /// Source split to compile (default `train`)
    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = split.into();
        self
    }

    /// Restrict the source stream
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Log progress every `n` episodes; 0 disables progress lines
    pub fn with_progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transform names in order
    pub fn transform_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Validator names in order
    pub fn validator_names(&self) -> Vec<&str> {
        self.runner.names()
    }

    /// Handle that cancels runs of this compiler
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Compile the selected episodes of `adapter` into `output_root`.
    pub fn compile(
        &mut self,
        adapter: &mut dyn Adapter,
        writer: &mut dyn EpisodeWriter,
        output_root: &Path,
    ) -> Result<CompileResult> {
        let started = Instant::now();
        if self.config.workers > 1 {
            warn!(workers = self.config.workers, "Parallel workers not supported; compiling serially");
        }
        if self.config.resume {
            warn!("Resume not supported; starting a fresh build");
        }

        let mut spec = adapter.probe()?;
        fs::create_dir_all(output_root)?;
        let layout = ArtifactLayout::new(output_root);
        let mut manifest = RunManifest::create(
            self.config.hash()?,
            serde_json::to_value(&self.config)?,
            spec.source_uri.clone(),
            output_root,
        );
        manifest.save(&layout.manifest_path())?;
        spec.build_id = Some(manifest.build_id.clone());
        self.chain.record_pipeline(&mut spec);
        self.runner.take_report();

        let span = info_span!("compile", build_id = %manifest.build_id);
        let _guard = span.enter();
        info!(
            dataset = %spec.dataset_name,
            split = %self.split,
            selector = %self.selector,
            output = %output_root.display(),
            "Compiling"
        );

        let finalizer = Finalizer::new(output_root);
        let outcome = self.run(adapter, writer, &layout, spec, &mut manifest, &finalizer, started);
        if let Err(e) = adapter.close() {
            warn!(error = %e, "Adapter close failed");
        }

        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                if manifest.status.is_running() {
                    let duration = started.elapsed().as_secs_f64();
                    if let Err(seal) = finalizer.fail(&mut manifest, &e.to_string(), duration) {
                        error!(error = %seal, "Could not seal the failed build");
                    }
                }
                error!(error = %e, "Compilation failed");
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        adapter: &mut dyn Adapter,
        writer: &mut dyn EpisodeWriter,
        layout: &ArtifactLayout,
        mut spec: DatasetSpec,
        manifest: &mut RunManifest,
        finalizer: &Finalizer,
        started: Instant,
    ) -> Result<CompileResult> {
        let mut tally = Tally::default();
        let mut begun = false;

        let mut stream = adapter.iter_episodes(&self.split, &self.selector)?;
        loop {
            if self.cancel.is_cancelled() {
                warn!(seen = tally.seen, "Compilation cancelled");
                tally.cancelled = true;
                break;
            }
            let Some(item) = stream.next() else {
                break;
            };
            let episode = item?;
            let span = debug_span!("episode", episode_id = %episode.episode_id);
            let _guard = span.enter();

            let mut episode = self.chain.apply(episode, &mut spec);
            let outcome = self.runner.validate(&episode, &spec);
            tally.seen += 1;
            if outcome.quarantined {
                debug!(verdict = %outcome.verdict, "Episode quarantined");
            }

            match outcome.verdict {
                Verdict::Rejected => {
                    tally.rejected += 1;
                    debug!(findings = outcome.findings.len(), "Episode rejected");
                }
                verdict => {
                    if verdict == Verdict::Invalid {
                        episode.invalid = true;
                        tally.invalid += 1;
                    }
                    if !begun {
                        spec.infer_schema(&episode);
                        writer.begin(&spec, layout.root())?;
                        begun = true;
                    }
                    writer.write_episode(&episode)?;
                    tally.written += 1;
                }
            }

            if outcome.abort {
                warn!(episode_id = %episode.episode_id, "Fail-fast triggered; stopping");
                tally.aborted = true;
                break;
            }
            if self.progress_every > 0 && tally.seen % self.progress_every == 0 {
                info!(
                    seen = tally.seen,
                    written = tally.written,
                    rejected = tally.rejected,
                    invalid = tally.invalid,
                    "Progress"
                );
            }
        }

        if !begun {
            writer.begin(&spec, layout.root())?;
        }
        let mut summary = writer.finalize()?;

        let report = self.runner.take_report();
        for path in ReportWriter::new(layout.reports_dir()).write(&report)? {
            if let Some(rel) = relative_path(layout.root(), &path) {
                summary.artifacts.push(rel);
            }
        }

        let duration = started.elapsed().as_secs_f64();
        let artifacts = if tally.cancelled {
            finalizer.fail(manifest, "cancelled", duration)?;
            summary.artifacts.clone()
        } else {
            finalizer
                .finalize(manifest, &summary, tally.written, duration)?
                .artifacts
        };

        info!(
            written = tally.written,
            rejected = tally.rejected,
            invalid = tally.invalid,
            frames = summary.total_frames,
            secs = duration,
            "Compilation complete"
        );

        Ok(CompileResult {
            success: manifest.status.is_completed() && !tally.aborted,
            output_dir: layout.root().to_path_buf(),
            spec,
            report,
            artifacts,
            episodes_written: tally.written,
            episodes_rejected: tally.rejected,
            episodes_invalid: tally.invalid,
            total_frames: summary.total_frames,
            aborted: tally.aborted,
            cancelled: tally.cancelled,
            manifest: manifest.clone(),
        })
    }

    /// Transform and validate without writing anything.
    ///
    /// Stops after `max_episodes` episodes, on a fail-fast abort or on
    /// cancellation.
    pub fn validate_only(
        &mut self,
        adapter: &mut dyn Adapter,
        split: &str,
        selector: &Selector,
        max_episodes: Option<usize>,
    ) -> Result<ValidationReport> {
        let mut spec = adapter.probe()?;
        self.chain.record_pipeline(&mut spec);
        self.runner.take_report();

        let mut count = 0usize;
        let mut stream = adapter.iter_episodes(split, selector)?;
        while !(max_episodes.is_some_and(|max| count >= max) || self.cancel.is_cancelled()) {
            let Some(item) = stream.next() else {
                break;
            };
            let episode = self.chain.apply(item?, &mut spec);
            let outcome = self.runner.validate(&episode, &spec);
            count += 1;
            if outcome.abort {
                break;
            }
        }
        drop(stream);
        adapter.close()?;

        let report = self.runner.take_report();
        info!(episodes = count, summary = %report.summary_line(), "Validation complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use crate::error::CompileError;
    use datakit_core::{Episode, Step, Tensor};
    use datakit_durability::{verify_checksums, RunStatus};
    use datakit_storage::{read_index, LeRobotV3Writer, RawFrameEncoderFactory, WriterOptions};
    use datakit_validate::{EpisodeLengthValidator, RldsInvariantValidator};
    use std::collections::BTreeMap;

    fn episode(id: &str, n: usize) -> Episode {
        let steps = (0..n)
            .map(|i| {
                let mut step = Step::new(BTreeMap::new())
                    .with_observation("observation.images.front", Tensor::rgb(4, 4))
                    .with_observation("observation.state", Tensor::vector(vec![i as f32; 3]))
                    .with_flags(i == 0, i + 1 == n, i + 1 == n)
                    .with_timestamp(i as f64 * 0.1);
                if i + 1 < n {
                    step = step.with_action(vec![0.1; 7]);
                }
                step
            })
            .collect();
        Episode::new(id, "demo", steps)
    }

    fn writer() -> LeRobotV3Writer {
        LeRobotV3Writer::with_encoder(WriterOptions::default(), Arc::new(RawFrameEncoderFactory))
    }

    fn adapter(episodes: Vec<Episode>) -> InMemoryAdapter {
        InMemoryAdapter::new(DatasetSpec::new("demo", "demo"), episodes)
    }

    #[test]
    fn test_three_episodes_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default()).with_validator(RldsInvariantValidator);
        let mut source = adapter(vec![episode("e0", 5), episode("e1", 5), episode("e2", 5)]);

        let result = compiler.compile(&mut source, &mut writer(), dir.path()).unwrap();
        assert!(result.success);
        assert_eq!(result.episodes_written, 3);
        assert_eq!(result.total_frames, 15);
        assert_eq!(result.manifest.status, RunStatus::Completed);

        let records = read_index(&ArtifactLayout::new(dir.path()).index_path()).unwrap();
        let ranges: Vec<(u64, u64)> = records.iter().map(|r| (r.parquet_row_start, r.parquet_row_end)).collect();
        assert_eq!(ranges, vec![(0, 5), (5, 10), (10, 15)]);
        assert!(verify_checksums(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("reports/validation_summary.json").is_file());
    }

    #[test]
    fn test_rejected_episodes_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default()).with_validator(EpisodeLengthValidator {
            min_length: 3,
            max_length: 4,
        });
        // 2 steps: ERROR; 5 steps: WARN only; 3 steps: valid
        let mut source = adapter(vec![episode("short", 2), episode("long", 5), episode("ok", 3)]);

        let result = compiler.compile(&mut source, &mut writer(), dir.path()).unwrap();
        assert_eq!(result.episodes_rejected, 1);
        assert_eq!(result.episodes_written, 2);
        assert_eq!(result.episodes_invalid, 1);

        let records = read_index(&ArtifactLayout::new(dir.path()).index_path()).unwrap();
        let flags: Vec<(&str, bool)> = records.iter().map(|r| (r.episode_id.as_str(), r.invalid)).collect();
        assert_eq!(flags, vec![("long", true), ("ok", false)]);
    }

    #[test]
    fn test_fail_fast_stops_consuming() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.validation.fail_fast = true;
        let mut compiler = Compiler::new(config).with_validator(RldsInvariantValidator);
        let mut source = adapter(vec![episode("a", 3), episode("bad", 0), episode("c", 3)]);

        let result = compiler.compile(&mut source, &mut writer(), dir.path()).unwrap();
        assert!(result.aborted);
        assert!(!result.success);
        assert_eq!(result.episodes_written, 1);
        assert_eq!(result.report.total_episodes, 2);
        assert_eq!(result.manifest.status, RunStatus::Completed);
    }

    #[test]
    fn test_cancel_seals_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default());
        compiler.cancel_handle().cancel();
        let mut source = adapter(vec![episode("a", 3)]);

        let result = compiler.compile(&mut source, &mut writer(), dir.path()).unwrap();
        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.episodes_written, 0);
        let manifest = RunManifest::load(&ArtifactLayout::new(dir.path()).manifest_path()).unwrap();
        assert_eq!(manifest.status, RunStatus::Failed);
        assert_eq!(manifest.error.as_deref(), Some("cancelled"));
    }

    /// Cancels `handle` once it has transformed episode `after`.
    struct CancelAfter {
        handle: CancelHandle,
        after: &'static str,
    }

    impl Transform for CancelAfter {
        fn name(&self) -> &str {
            "cancel_after"
        }

        fn apply(&self, episode: Episode, _ctx: &mut datakit_transform::TransformContext<'_>) -> Episode {
            if episode.episode_id == self.after {
                self.handle.cancel();
            }
            episode
        }
    }

    /// Counts how many episodes were pulled from the stream.
    struct CountingAdapter {
        inner: InMemoryAdapter,
        pulled: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Adapter for CountingAdapter {
        fn probe(&mut self) -> crate::error::AdapterResult<DatasetSpec> {
            self.inner.probe()
        }

        fn iter_episodes(
            &mut self,
            split: &str,
            selector: &Selector,
        ) -> crate::error::AdapterResult<crate::adapter::EpisodeStream<'_>> {
            let pulled = Arc::clone(&self.pulled);
            let stream = self.inner.iter_episodes(split, selector)?;
            Ok(Box::new(stream.inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })))
        }
    }

    #[test]
    fn test_cancel_mid_run_reads_no_further_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default());
        let handle = compiler.cancel_handle();
        compiler.add_transform(Box::new(CancelAfter { handle, after: "a" }));
        let pulled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut source = CountingAdapter {
            inner: adapter(vec![episode("a", 3), episode("b", 3), episode("c", 3)]),
            pulled: Arc::clone(&pulled),
        };

        let result = compiler.compile(&mut source, &mut writer(), dir.path()).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.episodes_written, 1);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_writer_error_seals_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default());
        let mut source = adapter(vec![episode("a", 3)]);
        let mut w = writer();
        // A writer that was already finalized refuses further work
        w.begin(&DatasetSpec::new("x", "x"), &dir.path().join("elsewhere")).unwrap();
        w.finalize().unwrap();

        let err = compiler.compile(&mut source, &mut w, dir.path()).unwrap_err();
        assert!(matches!(err, CompileError::Storage(_)));
        let manifest = RunManifest::load(&ArtifactLayout::new(dir.path()).manifest_path()).unwrap();
        assert_eq!(manifest.status, RunStatus::Failed);
        assert!(manifest.error.is_some());
    }

    #[test]
    fn test_validate_only_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default()).with_validator(RldsInvariantValidator);
        let mut source = adapter(vec![episode("a", 3), episode("b", 0), episode("c", 3)]);

        let report = compiler
            .validate_only(&mut source, "train", &Selector::all(), Some(2))
            .unwrap();
        assert_eq!(report.total_episodes, 2);
        assert_eq!(report.error_episodes, 1);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_unknown_split_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = Compiler::new(Config::default()).with_split("test");
        let err = compiler
            .compile(&mut adapter(vec![episode("a", 3)]), &mut writer(), dir.path())
            .unwrap_err();
        assert!(matches!(err, CompileError::Adapter(_)));
    }
}
