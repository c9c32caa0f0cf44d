//! Timestamp canonicalization and resampling.

use crate::chain::{Transform, TransformContext};
use datakit_core::{DatasetSpec, Episode, Step};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn control_period(configured: Option<f64>, spec: &DatasetSpec) -> f64 {
    let rate = configured
        .filter(|r| *r > 0.0)
        .or(Some(spec.control_rate_hz).filter(|r| *r > 0.0))
        .unwrap_or(10.0);
    1.0 / rate
}

/// Fills missing timestamps with `i * dt` and forces strict monotonicity:
/// a timestamp not after its predecessor becomes `prev + dt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampCanonicalize {
    /// Control rate for `dt`; the spec's rate when unset
    pub control_rate_hz: Option<f64>,
}

impl Transform for TimestampCanonicalize {
    fn name(&self) -> &str {
        "timestamp_canonicalize"
    }

    fn apply(&self, episode: Episode, ctx: &mut TransformContext<'_>) -> Episode {
        let dt = control_period(self.control_rate_hz, ctx.spec);
        let mut prev: Option<f64> = None;
        let steps = episode
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let mut ts = step.timestamp.unwrap_or(i as f64 * dt);
                if let Some(p) = prev {
                    if ts <= p {
                        ts = p + dt;
                    }
                }
                prev = Some(ts);
                Step {
                    timestamp: Some(ts),
                    ..step.clone()
                }
            })
            .collect();
        episode.with_steps(steps)
    }
}

/// Nearest-neighbour resampling onto a uniform grid at `target_rate_hz`.
///
/// The grid starts at the first timestamp and includes the last one when it
/// falls on the grid. First/last flags are re-marked; the new last step
/// drops its action and inherits the source's terminal flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Resample {
    /// Output control rate
    pub target_rate_hz: f64,
}

impl Default for Resample {
    fn default() -> Self {
        Resample { target_rate_hz: 10.0 }
    }
}

impl Transform for Resample {
    fn name(&self) -> &str {
        "resample"
    }

    fn apply(&self, episode: Episode, ctx: &mut TransformContext<'_>) -> Episode {
        if episode.steps.is_empty() || self.target_rate_hz <= 0.0 {
            return episode;
        }
        let src_dt = control_period(None, ctx.spec);
        let times: Vec<f64> = episode
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| s.timestamp.unwrap_or(i as f64 * src_dt))
            .collect();
        let start = times[0];
        let end = times[times.len() - 1];
        if end <= start {
            return episode;
        }

        let dt = 1.0 / self.target_rate_hz;
        let count = ((end - start) / dt + 1e-9).floor() as usize + 1;
        let last_terminal = episode.steps[episode.steps.len() - 1].is_terminal;

        let mut steps: Vec<Step> = (0..count)
            .map(|k| {
                let t = start + k as f64 * dt;
                let nearest = times
                    .iter()
                    .enumerate()
                    .min_by(|a, b| (a.1 - t).abs().total_cmp(&(b.1 - t).abs()))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                Step {
                    is_first: k == 0,
                    is_last: false,
                    is_terminal: false,
                    timestamp: Some(t),
                    ..episode.steps[nearest].clone()
                }
            })
            .collect();
        if let Some(last) = steps.last_mut() {
            last.is_last = true;
            last.is_terminal = last_terminal;
            last.action = None;
        }
        debug!(
            episode_id = %episode.episode_id,
            from = episode.steps.len(),
            to = steps.len(),
            "Resampled episode"
        );
        episode.with_steps(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_core::TaskCatalog;

    fn run(t: &dyn Transform, ep: Episode) -> Episode {
        let spec = DatasetSpec::new("d", "d");
        let mut catalog = TaskCatalog::new();
        let mut camera = None;
        let mut ctx = TransformContext {
            spec: &spec,
            catalog: &mut catalog,
            canonical_camera: &mut camera,
        };
        t.apply(ep, &mut ctx)
    }

    fn episode(ts: &[Option<f64>]) -> Episode {
        let n = ts.len();
        let steps = ts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut s = Step::default()
                    .with_flags(i == 0, i == n - 1, i == n - 1)
                    .with_action(vec![i as f32]);
                s.timestamp = *t;
                if i == n - 1 {
                    s.action = None;
                }
                s
            })
            .collect();
        Episode::new("e", "d", steps)
    }

    fn times(ep: &Episode) -> Vec<f64> {
        ep.steps.iter().map(|s| s.timestamp.unwrap()).collect()
    }

    #[test]
    fn test_fill_and_monotonic() {
        let ep = episode(&[None, Some(0.1), Some(0.1), None, Some(0.2)]);
        let out = run(&TimestampCanonicalize::default(), ep);
        let t = times(&out);
        let expected = [0.0, 0.1, 0.2, 0.3, 0.4];
        for (a, b) in t.iter().zip(expected) {
            assert!((a - b).abs() < 1e-9, "{:?}", t);
        }
    }

    #[test]
    fn test_resample_halves_rate() {
        let ts: Vec<Option<f64>> = (0..11).map(|i| Some(i as f64 * 0.1)).collect();
        let out = run(&Resample { target_rate_hz: 5.0 }, episode(&ts));
        assert_eq!(out.num_steps(), 6);
        assert!(out.steps[0].is_first);
        assert!(out.steps[5].is_last);
        assert!(out.steps[5].is_terminal);
        assert!(out.steps[5].action.is_none());
        assert_eq!(out.steps[1].action, Some(vec![2.0]));
        assert!(out.validate_structure().is_empty());
    }

    #[test]
    fn test_resample_zero_duration_passthrough() {
        let ep = episode(&[Some(0.0)]);
        assert_eq!(run(&Resample::default(), ep.clone()), ep);
    }
}
