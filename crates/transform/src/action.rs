//! Action canonicalization: normalization, padding and action-space mapping.

use crate::chain::{Transform, TransformContext};
use datakit_core::{Episode, Step};
use serde::{Deserialize, Serialize};
use tracing::warn;

const RANGE_EPSILON: f32 = 1e-8;

fn map_actions(episode: Episode, mut f: impl FnMut(&[f32]) -> Vec<f32>) -> Episode {
    let steps = episode
        .steps
        .iter()
        .map(|step| match &step.action {
            Some(action) => Step {
                action: Some(f(action)),
                ..step.clone()
            },
            None => step.clone(),
        })
        .collect();
    episode.with_steps(steps)
}

// ============================================================================
// NormalizeActions
// ============================================================================

/// Maps actions into `[-1, 1]`.
///
/// With `bounds`, every component uses the same `(lo, hi)`. Without, bounds
/// are the per-component min/max of the episode's own actions; components
/// with zero range use `(-1, 1)`. Episodes whose actions disagree in length
/// are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeActions {
    /// Fixed `(lo, hi)` for every component
    pub bounds: Option<(f32, f32)>,
    /// Clip results into `[-1, 1]`
    pub clip: bool,
}

impl Default for NormalizeActions {
    fn default() -> Self {
        NormalizeActions {
            bounds: None,
            clip: true,
        }
    }
}

impl NormalizeActions {
    fn episode_bounds(episode: &Episode) -> Option<(Vec<f32>, Vec<f32>)> {
        let mut actions = episode.actions();
        let first = actions.next()?;
        let mut lo = first.to_vec();
        let mut hi = first.to_vec();
        for a in actions {
            if a.len() != lo.len() {
                return None;
            }
            for (i, &x) in a.iter().enumerate() {
                lo[i] = lo[i].min(x);
                hi[i] = hi[i].max(x);
            }
        }
        for i in 0..lo.len() {
            if hi[i] - lo[i] < RANGE_EPSILON {
                lo[i] = -1.0;
                hi[i] = 1.0;
            }
        }
        Some((lo, hi))
    }
}

impl Transform for NormalizeActions {
    fn name(&self) -> &str {
        "normalize_actions"
    }

    fn apply(&self, episode: Episode, _ctx: &mut TransformContext<'_>) -> Episode {
        let clip = self.clip;
        let scale = move |x: f32, lo: f32, hi: f32| {
            let y = 2.0 * (x - lo) / (hi - lo) - 1.0;
            if clip {
                y.clamp(-1.0, 1.0)
            } else {
                y
            }
        };

        match self.bounds {
            Some((lo, hi)) => {
                if hi - lo < RANGE_EPSILON {
                    warn!(lo, hi, "Degenerate action bounds, skipping normalization");
                    return episode;
                }
                map_actions(episode, |a| a.iter().map(|&x| scale(x, lo, hi)).collect())
            }
            None => {
                let Some((lo, hi)) = Self::episode_bounds(&episode) else {
                    if episode.actions().next().is_some() {
                        warn!(episode_id = %episode.episode_id, "Inconsistent action dimensions, skipping normalization");
                    }
                    return episode;
                };
                map_actions(episode, |a| {
                    a.iter()
                        .enumerate()
                        .map(|(i, &x)| scale(x, lo[i], hi[i]))
                        .collect()
                })
            }
        }
    }
}

// ============================================================================
// PadAction
// ============================================================================

/// Pads (or truncates) every action to `target_dim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PadAction {
    /// Output dimension
    pub target_dim: usize,
    /// Fill value for padded components
    pub pad_value: f32,
}

impl Default for PadAction {
    fn default() -> Self {
        PadAction {
            target_dim: 7,
            pad_value: 0.0,
        }
    }
}

impl Transform for PadAction {
    fn name(&self) -> &str {
        "pad_action"
    }

    fn apply(&self, episode: Episode, _ctx: &mut TransformContext<'_>) -> Episode {
        map_actions(episode, |a| {
            let mut out = a.to_vec();
            out.resize(self.target_dim, self.pad_value);
            out
        })
    }
}

// ============================================================================
// MapActionSpace
// ============================================================================

/// Named action layouts that [`MapActionSpace`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLayout {
    /// dx, dy, dz, drx, dry, drz, gripper
    #[default]
    EeDelta7,
    /// x, y, z, rx, ry, rz, gripper
    EeAbs7,
    /// 7 joint positions
    Joint7,
    /// 6 joint positions
    Joint6,
    /// 7 joints + gripper
    Joint7Gripper,
}

impl ActionLayout {
    /// Number of components
    pub fn dim(&self) -> usize {
        match self {
            ActionLayout::EeDelta7 | ActionLayout::EeAbs7 | ActionLayout::Joint7 => 7,
            ActionLayout::Joint6 => 6,
            ActionLayout::Joint7Gripper => 8,
        }
    }
}

/// Maps actions into a target layout.
///
/// Components are copied by position and the rest zero-filled. When the
/// target is `ee_delta_7` and the source is wider, the gripper component
/// (`gripper_index`, negative counts from the end) lands in slot 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapActionSpace {
    /// Source layout name, for provenance only
    pub source_space: Option<String>,
    /// Target layout
    pub target_space: ActionLayout,
    /// Gripper position in the source action
    pub gripper_index: i64,
}

impl Default for MapActionSpace {
    fn default() -> Self {
        MapActionSpace {
            source_space: None,
            target_space: ActionLayout::EeDelta7,
            gripper_index: -1,
        }
    }
}

impl MapActionSpace {
    fn map(&self, action: &[f32]) -> Vec<f32> {
        let dim = self.target_space.dim();
        let mut out = vec![0.0f32; dim];
        let n = action.len().min(dim);
        out[..n].copy_from_slice(&action[..n]);

        if self.target_space == ActionLayout::EeDelta7 && action.len() > dim {
            let idx = if self.gripper_index < 0 {
                action.len() as i64 + self.gripper_index
            } else {
                self.gripper_index
            };
            if let Some(&g) = usize::try_from(idx).ok().and_then(|i| action.get(i)) {
                out[6] = g;
            }
        }
        out
    }
}

impl Transform for MapActionSpace {
    fn name(&self) -> &str {
        "map_action_space"
    }

    fn apply(&self, episode: Episode, _ctx: &mut TransformContext<'_>) -> Episode {
        map_actions(episode, |a| self.map(a))
    }
}
