//! Streaming per-feature statistics.
//!
//! ## Design
//!
//! - One [`RunningStats`] per feature key: count, elementwise sum, sum of
//!   squares, min and max. Each `add` is O(dim); nothing is retained per
//!   sample.
//! - The first sample for a key fixes its dimension. Later samples with a
//!   different dimension are skipped and logged, not merged.
//! - Image and depth streams are never accumulated.
//! - `compute` uses the population variance `E[x^2] - E[x]^2`, clamped at 0
//!   before the square root.

use crate::episode::Episode;
use crate::keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Floor applied to `std` when normalizing
pub const STD_EPSILON: f64 = 1e-8;

/// Feature key used for actions
pub const ACTION_KEY: &str = "action";

/// Running sums for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    count: u64,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl RunningStats {
    fn new(dim: usize) -> Self {
        RunningStats {
            count: 0,
            sum: vec![0.0; dim],
            sum_sq: vec![0.0; dim],
            min: vec![f64::INFINITY; dim],
            max: vec![f64::NEG_INFINITY; dim],
        }
    }

    /// Dimension fixed by the first sample
    pub fn dim(&self) -> usize {
        self.sum.len()
    }

    /// Samples accumulated
    pub fn count(&self) -> u64 {
        self.count
    }

    fn push(&mut self, value: &[f64]) {
        self.count += 1;
        for (i, &x) in value.iter().enumerate() {
            self.sum[i] += x;
            self.sum_sq[i] += x * x;
            self.min[i] = self.min[i].min(x);
            self.max[i] = self.max[i].max(x);
        }
    }

    fn finish(&self) -> FeatureStats {
        let n = self.count.max(1) as f64;
        let mean: Vec<f64> = self.sum.iter().map(|s| s / n).collect();
        let std = self
            .sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt())
            .collect();
        FeatureStats {
            mean,
            std,
            min: self.min.clone(),
            max: self.max.clone(),
            count: self.count,
        }
    }
}

/// Final statistics for one feature, as written to `stats.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Elementwise mean
    pub mean: Vec<f64>,
    /// Elementwise population standard deviation
    pub std: Vec<f64>,
    /// Elementwise minimum
    pub min: Vec<f64>,
    /// Elementwise maximum
    pub max: Vec<f64>,
    /// Number of samples
    pub count: u64,
}

impl FeatureStats {
    /// `(x - mean) / max(std, STD_EPSILON)`, elementwise.
    pub fn normalize(&self, value: &[f64]) -> Vec<f64> {
        value
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s.max(STD_EPSILON))
            .collect()
    }

    /// Inverse of [`normalize`](Self::normalize).
    pub fn denormalize(&self, value: &[f64]) -> Vec<f64> {
        value
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| x * s.max(STD_EPSILON) + m)
            .collect()
    }
}

/// Feature key -> statistics.
pub type DatasetStats = BTreeMap<String, FeatureStats>;

/// Streaming accumulator keyed by feature name.
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    features: BTreeMap<String, RunningStats>,
    skipped: u64,
}

impl StatsAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample. Returns false when the sample was skipped because
    /// its dimension disagrees with earlier samples for `key`.
    pub fn add(&mut self, key: &str, value: &[f64]) -> bool {
        let stats = self
            .features
            .entry(key.to_string())
            .or_insert_with(|| RunningStats::new(value.len()));
        if stats.dim() != value.len() {
            self.skipped += 1;
            warn!(
                key,
                expected = stats.dim(),
                actual = value.len(),
                "Skipping stats sample with mismatched dimension"
            );
            return false;
        }
        stats.push(value);
        true
    }

    /// Accumulate every step's action and numeric non-image observations.
    pub fn add_episode(&mut self, episode: &Episode) {
        for step in &episode.steps {
            if let Some(action) = &step.action {
                let values: Vec<f64> = action.iter().map(|&x| x as f64).collect();
                self.add(ACTION_KEY, &values);
            }
            for (key, value) in &step.observation {
                if keys::is_image_key(key) || keys::is_depth_key(key) {
                    continue;
                }
                if let Some(values) = value.to_f64_vec() {
                    self.add(key, &values);
                }
            }
        }
    }

    /// Running stats for `key`
    pub fn get(&self, key: &str) -> Option<&RunningStats> {
        self.features.get(key)
    }

    /// Samples dropped for dimension mismatch
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Final statistics for every feature seen.
    pub fn compute(&self) -> DatasetStats {
        self.features
            .iter()
            .map(|(k, s)| (k.clone(), s.finish()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::Step;
    use crate::value::Tensor;
    use proptest::prelude::*;

    #[test]
    fn test_two_samples() {
        let mut acc = StatsAccumulator::new();
        acc.add("x", &[1.0, 2.0, 3.0]);
        acc.add("x", &[2.0, 3.0, 4.0]);
        let stats = &acc.compute()["x"];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, vec![1.5, 2.5, 3.5]);
        assert_eq!(stats.std, vec![0.5, 0.5, 0.5]);
        assert_eq!(stats.min, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.max, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let mut acc = StatsAccumulator::new();
        assert!(acc.add("x", &[1.0, 2.0]));
        assert!(!acc.add("x", &[1.0, 2.0, 3.0]));
        assert_eq!(acc.skipped(), 1);
        assert_eq!(acc.compute()["x"].count, 1);
    }

    #[test]
    fn test_episode_skips_images() {
        let steps = vec![
            Step::default()
                .with_observation("observation.images.front", Tensor::rgb(2, 2))
                .with_observation("observation.state", Tensor::vector(vec![1.0, 2.0]))
                .with_observation("observation.language", "wipe")
                .with_action(vec![0.5]),
            Step::default()
                .with_observation("observation.images.front", Tensor::rgb(2, 2))
                .with_observation("observation.state", Tensor::vector(vec![3.0, 4.0]))
                .with_observation("observation.language", "wipe"),
        ];
        let mut acc = StatsAccumulator::new();
        acc.add_episode(&Episode::new("e", "d", steps));
        let stats = acc.compute();
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["action", "observation.state"]);
        assert_eq!(stats["action"].count, 1);
        assert_eq!(stats["observation.state"].mean, vec![2.0, 3.0]);
    }

    #[test]
    fn test_normalize_constant_feature() {
        let mut acc = StatsAccumulator::new();
        acc.add("c", &[4.0]);
        acc.add("c", &[4.0]);
        let stats = &acc.compute()["c"];
        assert_eq!(stats.normalize(&[4.0]), vec![0.0]);
        let back = stats.denormalize(&stats.normalize(&[5.0]));
        assert!((back[0] - 5.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_mean_within_bounds(samples in proptest::collection::vec(
            proptest::collection::vec(-1e3f64..1e3, 3), 1..50))
        {
            let mut acc = StatsAccumulator::new();
            for s in &samples {
                acc.add("f", s);
            }
            let stats = &acc.compute()["f"];
            prop_assert_eq!(stats.count as usize, samples.len());
            for i in 0..3 {
                prop_assert!(stats.min[i] <= stats.mean[i] + 1e-9);
                prop_assert!(stats.mean[i] <= stats.max[i] + 1e-9);
                prop_assert!(stats.std[i] >= 0.0);
            }
        }
    }
}
