//! Transform contract and chain execution.
//!
//! ## Design
//!
//! - A [`Transform`] consumes an episode and returns a new one. It sees the
//!   dataset spec read-only; the task catalog is the only shared mutable
//!   state, reached through [`TransformContext`].
//! - Transforms do not fail. A recoverable problem (missing camera, empty
//!   task text) yields the episode unchanged or a default, plus a log line.
//! - The chain applies transforms in insertion order and records their
//!   names on the spec as build provenance.

use datakit_core::{DatasetSpec, Episode, TaskCatalog};
use tracing::trace;

/// What a transform may read and write besides the episode.
pub struct TransformContext<'a> {
    /// Dataset spec, read-only
    pub spec: &'a DatasetSpec,
    /// Task catalog, append-only
    pub catalog: &'a mut TaskCatalog,
    /// Camera chosen as canonical; set by the first episode that picks one
    pub canonical_camera: &'a mut Option<String>,
}

/// An episode-to-episode canonicalization step.
pub trait Transform: Send + Sync {
    /// Name recorded in `DatasetSpec::transform_pipeline`
    fn name(&self) -> &str;

    /// Produce the transformed episode.
    fn apply(&self, episode: Episode, ctx: &mut TransformContext<'_>) -> Episode;
}

/// Returns episodes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, episode: Episode, _ctx: &mut TransformContext<'_>) -> Episode {
        episode
    }
}

/// Ordered list of transforms.
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    /// Empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a boxed transform
    pub fn add(&mut self, transform: Box<dyn Transform>) -> &mut Self {
        self.transforms.push(transform);
        self
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Transform names in order
    pub fn names(&self) -> Vec<String> {
        self.transforms.iter().map(|t| t.name().to_string()).collect()
    }

    /// Number of transforms
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// True when the chain is empty
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Write the chain's names into `spec.transform_pipeline`.
    pub fn record_pipeline(&self, spec: &mut DatasetSpec) {
        spec.transform_pipeline = self.names();
    }

    /// Run every transform over `episode`.
    ///
    /// The spec's task catalog and canonical camera are lent to the
    /// transforms for the duration of the call; everything else in the spec
    /// stays read-only.
    pub fn apply(&self, mut episode: Episode, spec: &mut DatasetSpec) -> Episode {
        let mut catalog = std::mem::take(&mut spec.task_catalog);
        let mut camera = spec.canonical_camera.take();
        {
            let mut ctx = TransformContext {
                spec,
                catalog: &mut catalog,
                canonical_camera: &mut camera,
            };
            for transform in &self.transforms {
                trace!(transform = transform.name(), episode_id = %episode.episode_id, "Applying transform");
                episode = transform.apply(episode, &mut ctx);
            }
        }
        spec.task_catalog = catalog;
        spec.canonical_camera = camera;
        episode
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TransformChain").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_core::Step;

    struct Tag(&'static str);

    impl Transform for Tag {
        fn name(&self) -> &str {
            self.0
        }
        fn apply(&self, mut episode: Episode, ctx: &mut TransformContext<'_>) -> Episode {
            let id = ctx.catalog.get_or_add(self.0);
            episode.metadata.insert(self.0.to_string(), serde_json::json!(id));
            episode
        }
    }

    #[test]
    fn test_chain_order_and_catalog() {
        let chain = TransformChain::new().with(Tag("a")).with(Identity).with(Tag("b"));
        let mut spec = DatasetSpec::new("d", "d");
        chain.record_pipeline(&mut spec);
        assert_eq!(spec.transform_pipeline, vec!["a", "identity", "b"]);

        let ep = Episode::new("e", "d", vec![Step::default()]);
        let out = chain.apply(ep, &mut spec);
        assert_eq!(out.metadata["a"], 0);
        assert_eq!(out.metadata["b"], 1);
        // catalog updates survive the call
        assert_eq!(spec.task_catalog.len(), 2);
    }
}
