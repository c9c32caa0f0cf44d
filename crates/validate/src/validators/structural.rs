//! Structural and temporal validators.

use crate::finding::Finding;
use crate::runner::Validator;
use datakit_core::{DatasetSpec, Episode};
use serde::{Deserialize, Serialize};

// ============================================================================
// RLDS invariants
// ============================================================================

/// RLDS step-flag invariants.
///
/// ERROR: no steps (E001), first step not `is_first` (E002), last step not
/// `is_last` (E003), `is_first` after the first step (E004), `is_last`
/// before the last step (E005).
/// WARN: action on the last step (W001), terminal step that is not last (W002).
#[derive(Debug, Clone, Copy, Default)]
pub struct RldsInvariantValidator;

impl Validator for RldsInvariantValidator {
    fn name(&self) -> &str {
        "rlds_invariants"
    }

    fn validate(&self, episode: &Episode, _spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        let n = episode.steps.len();
        if n == 0 {
            findings.push(Finding::error("E001", "episode has no steps"));
            return findings;
        }

        if !episode.steps[0].is_first {
            findings.push(Finding::error("E002", "first step must have is_first=true").at_step(0));
        }
        let last = &episode.steps[n - 1];
        if !last.is_last {
            findings.push(Finding::error("E003", "last step must have is_last=true").at_step(n - 1));
        }
        if last.action.is_some() {
            findings.push(
                Finding::warn("W001", "last step should carry no action")
                    .at_step(n - 1)
                    .on_field("action"),
            );
        }

        for (i, step) in episode.steps.iter().enumerate().skip(1) {
            if step.is_first {
                findings.push(Finding::error("E004", "only the first step may have is_first=true").at_step(i));
            }
        }
        for (i, step) in episode.steps.iter().enumerate().take(n - 1) {
            if step.is_last {
                findings.push(Finding::error("E005", "only the last step may have is_last=true").at_step(i));
            }
        }
        for (i, step) in episode.steps.iter().enumerate() {
            if step.is_terminal && !step.is_last {
                findings.push(Finding::warn("W002", "terminal step is not marked is_last").at_step(i));
            }
        }
        findings
    }
}

// ============================================================================
// Episode length
// ============================================================================

/// Step-count bounds: shorter than `min_length` is ERROR (E010), longer
/// than `max_length` is WARN (W010).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpisodeLengthValidator {
    /// Minimum steps
    pub min_length: usize,
    /// Maximum steps before warning
    pub max_length: usize,
}

impl Default for EpisodeLengthValidator {
    fn default() -> Self {
        EpisodeLengthValidator {
            min_length: 1,
            max_length: 100_000,
        }
    }
}

impl Validator for EpisodeLengthValidator {
    fn name(&self) -> &str {
        "episode_length"
    }

    fn validate(&self, episode: &Episode, _spec: &DatasetSpec) -> Vec<Finding> {
        let n = episode.num_steps();
        let mut findings = Vec::new();
        if n < self.min_length {
            findings.push(
                Finding::error("E010", format!("episode too short: {} < {}", n, self.min_length))
                    .with_value(n),
            );
        }
        if n > self.max_length {
            findings.push(
                Finding::warn("W010", format!("episode very long: {} > {}", n, self.max_length))
                    .with_value(n),
            );
        }
        findings
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Timestamp monotonicity and gaps.
///
/// A decrease is ERROR (E020). A gap larger than `max_gap_factor` control
/// periods is WARN (W020). Pairs with a missing timestamp are skipped and
/// reported once as INFO (I020).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampValidator {
    /// Allowed gap as a multiple of `1 / control_rate_hz`
    pub max_gap_factor: f64,
}

impl Default for TimestampValidator {
    fn default() -> Self {
        TimestampValidator { max_gap_factor: 2.0 }
    }
}

impl Validator for TimestampValidator {
    fn name(&self) -> &str {
        "timestamps"
    }

    fn validate(&self, episode: &Episode, spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        if episode.steps.len() < 2 {
            return findings;
        }

        let rate = if spec.control_rate_hz > 0.0 { spec.control_rate_hz } else { 10.0 };
        let expected = 1.0 / rate;
        let max_gap = expected * self.max_gap_factor;

        if episode.steps.iter().any(|s| s.timestamp.is_none()) {
            findings.push(Finding::info("I020", "episode has steps without timestamps"));
        }

        for (i, pair) in episode.steps.windows(2).enumerate() {
            let (Some(prev), Some(curr)) = (pair[0].timestamp, pair[1].timestamp) else {
                continue;
            };
            let step = i + 1;
            if curr < prev {
                findings.push(
                    Finding::error("E020", format!("non-monotonic timestamp: {} < {}", curr, prev))
                        .at_step(step)
                        .on_field("timestamp"),
                );
            }
            let gap = curr - prev;
            if gap > max_gap {
                findings.push(
                    Finding::warn(
                        "W020",
                        format!("large timestamp gap: {:.3}s (expected ~{:.3}s)", gap, expected),
                    )
                    .at_step(step)
                    .on_field("timestamp"),
                );
            }
        }
        findings
    }
}

// ============================================================================
// Action sanity
// ============================================================================

/// Action value checks.
///
/// - E030: any NaN or infinite component
/// - E031: action dimension differs from the first action
/// - W030: component outside `bounds` (reported once per episode)
/// - W031: per-episode z-score above `sigma_threshold` (reported once)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionSanityValidator {
    /// Inclusive `(min, max)` per component
    pub bounds: (f32, f32),
    /// Outlier threshold in standard deviations
    pub sigma_threshold: f64,
}

impl Default for ActionSanityValidator {
    fn default() -> Self {
        ActionSanityValidator {
            bounds: (-10.0, 10.0),
            sigma_threshold: 5.0,
        }
    }
}

impl Validator for ActionSanityValidator {
    fn name(&self) -> &str {
        "action_sanity"
    }

    fn validate(&self, episode: &Episode, _spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        let actions: Vec<(usize, &[f32])> = episode
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.action.as_deref().map(|a| (i, a)))
            .collect();
        let Some(&(_, first)) = actions.first() else {
            return findings;
        };
        let dim = first.len();

        if let Some(&(i, a)) = actions.iter().find(|(_, a)| a.len() != dim) {
            findings.push(
                Finding::error("E031", format!("action dimension {} differs from {}", a.len(), dim))
                    .at_step(i)
                    .on_field("action"),
            );
            return findings;
        }

        let (lo, hi) = self.bounds;
        if let Some(&(i, _)) = actions
            .iter()
            .find(|(_, a)| a.iter().any(|&x| x < lo || x > hi))
        {
            findings.push(
                Finding::warn("W030", format!("action out of bounds [{}, {}]", lo, hi))
                    .at_step(i)
                    .on_field("action"),
            );
        }

        if let Some(&(i, _)) = actions.iter().find(|(_, a)| a.iter().any(|x| !x.is_finite())) {
            findings.push(
                Finding::error("E030", "action contains NaN or Inf")
                    .at_step(i)
                    .on_field("action"),
            );
            return findings;
        }

        let n = actions.len() as f64;
        let mut mean = vec![0.0f64; dim];
        for (_, a) in &actions {
            for (m, &x) in mean.iter_mut().zip(a.iter()) {
                *m += x as f64 / n;
            }
        }
        let mut std = vec![0.0f64; dim];
        for (_, a) in &actions {
            for ((s, m), &x) in std.iter_mut().zip(&mean).zip(a.iter()) {
                *s += (x as f64 - m).powi(2) / n;
            }
        }
        for s in &mut std {
            *s = s.sqrt();
            if *s < 1e-8 {
                *s = 1.0;
            }
        }

        let outlier = actions.iter().find(|(_, a)| {
            a.iter()
                .zip(mean.iter().zip(&std))
                .any(|(&x, (m, s))| ((x as f64 - m) / s).abs() > self.sigma_threshold)
        });
        if let Some(&(i, _)) = outlier {
            findings.push(
                Finding::warn(
                    "W031",
                    format!("action outlier detected (z > {})", self.sigma_threshold),
                )
                .at_step(i)
                .on_field("action"),
            );
        }
        findings
    }
}
