//! Camera selection and image resizing.

use crate::chain::{Transform, TransformContext};
use datakit_core::{keys, Episode, Step, Tensor, TensorData, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Camera priority used when no camera is named.
pub const DEFAULT_FALLBACK_ORDER: &[&str] = &[
    "front",
    "cam_high",
    "image",
    "rgb",
    "agentview_rgb",
    "image_0",
    "exterior_image_1_left",
];

/// Copies one camera stream to a canonical key.
///
/// Selection: the named `camera` if present, else the first of
/// `fallback_order` present, else the alphabetically first camera. An
/// episode without cameras passes through unchanged. The first camera
/// chosen is recorded as the spec's `canonical_camera`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectCamera {
    /// Camera to select
    pub camera: Option<String>,
    /// Priority order when `camera` is unset or absent
    pub fallback_order: Vec<String>,
    /// Destination key
    pub target_key: String,
}

impl Default for SelectCamera {
    fn default() -> Self {
        SelectCamera {
            camera: None,
            fallback_order: DEFAULT_FALLBACK_ORDER.iter().map(|s| s.to_string()).collect(),
            target_key: keys::make_image_key(keys::CANONICAL_CAMERA),
        }
    }
}

impl SelectCamera {
    /// Select a specific camera
    pub fn named(camera: impl Into<String>) -> Self {
        SelectCamera {
            camera: Some(camera.into()),
            ..Default::default()
        }
    }

    /// Camera chosen from `available` (sorted, canonical excluded).
    pub fn choose<'a>(&self, available: &'a [String]) -> Option<&'a str> {
        let find = |name: &str| available.iter().find(|c| c.as_str() == name).map(String::as_str);
        if let Some(camera) = &self.camera {
            if let Some(found) = find(camera) {
                return Some(found);
            }
            warn!(camera = %camera, ?available, "Requested camera not present, using fallback order");
        }
        self.fallback_order
            .iter()
            .find_map(|name| find(name))
            .or_else(|| available.first().map(String::as_str))
    }
}

impl Transform for SelectCamera {
    fn name(&self) -> &str {
        "select_camera"
    }

    fn apply(&self, episode: Episode, ctx: &mut TransformContext<'_>) -> Episode {
        let target_camera = keys::camera_name(&self.target_key).unwrap_or(keys::CANONICAL_CAMERA);
        let available: Vec<String> = episode
            .camera_names()
            .into_iter()
            .filter(|c| c != target_camera)
            .collect();

        let Some(chosen) = self.choose(&available).map(str::to_string) else {
            warn!(episode_id = %episode.episode_id, "No camera available, episode left unchanged");
            return episode;
        };
        debug!(episode_id = %episode.episode_id, camera = %chosen, "Selected canonical camera");
        match ctx.canonical_camera.as_deref() {
            None => *ctx.canonical_camera = Some(chosen.clone()),
            Some(recorded) if recorded != chosen => {
                warn!(
                    episode_id = %episode.episode_id,
                    camera = %chosen,
                    recorded,
                    "Episode uses a different canonical camera"
                );
            }
            Some(_) => {}
        }

        let source_key = keys::make_image_key(&chosen);
        let steps = episode
            .steps
            .iter()
            .map(|step| {
                let mut step = step.clone();
                if let Some(value) = step.observation.get(&source_key).cloned() {
                    step.observation.insert(self.target_key.clone(), value);
                }
                step
            })
            .collect();
        episode.with_steps(steps)
    }
}

/// Nearest-neighbour resize of image tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeImages {
    /// Target `(height, width)`
    pub target_size: (usize, usize),
    /// Keys to resize; all image keys when unset
    pub keys: Option<Vec<String>>,
}

impl Default for ResizeImages {
    fn default() -> Self {
        ResizeImages {
            target_size: (256, 256),
            keys: None,
        }
    }
}

fn resample_rows<T: Copy>(src: &[T], h: usize, w: usize, c: usize, th: usize, tw: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(th * tw * c);
    for r in 0..th {
        let sr = r * h / th;
        for col in 0..tw {
            let sc = col * w / tw;
            let base = (sr * w + sc) * c;
            out.extend_from_slice(&src[base..base + c]);
        }
    }
    out
}

/// Nearest-neighbour resize of an `HxW` or `HxWxC` tensor. Returns `None`
/// when the tensor is not image-shaped or its buffer does not match.
pub fn resize_nearest(image: &Tensor, height: usize, width: usize) -> Option<Tensor> {
    let (h, w, c) = match image.shape.as_slice() {
        [h, w] => (*h, *w, 1),
        [h, w, c] => (*h, *w, *c),
        _ => return None,
    };
    if h == 0 || w == 0 || c == 0 || height == 0 || width == 0 || image.data.len() != h * w * c {
        return None;
    }
    let data = match &image.data {
        TensorData::U8(v) => TensorData::U8(resample_rows(v, h, w, c, height, width)),
        TensorData::I32(v) => TensorData::I32(resample_rows(v, h, w, c, height, width)),
        TensorData::I64(v) => TensorData::I64(resample_rows(v, h, w, c, height, width)),
        TensorData::F32(v) => TensorData::F32(resample_rows(v, h, w, c, height, width)),
        TensorData::F64(v) => TensorData::F64(resample_rows(v, h, w, c, height, width)),
        TensorData::Bool(v) => TensorData::Bool(resample_rows(v, h, w, c, height, width)),
    };
    let mut shape = vec![height, width];
    if image.shape.len() == 3 {
        shape.push(c);
    }
    Some(Tensor::new(shape, data))
}

impl ResizeImages {
    fn selected(&self, key: &str) -> bool {
        match &self.keys {
            Some(keys) => keys.iter().any(|k| k == key),
            None => keys::is_image_key(key),
        }
    }

    fn resize_step(&self, step: &Step) -> Step {
        let (th, tw) = self.target_size;
        let mut step = step.clone();
        for (key, value) in step.observation.iter_mut() {
            if !self.selected(key) {
                continue;
            }
            let Value::Tensor(t) = value else { continue };
            if t.shape.len() >= 2 && t.shape[0] == th && t.shape[1] == tw {
                continue;
            }
            match resize_nearest(t, th, tw) {
                Some(resized) => *t = resized,
                None => debug!(key = %key, shape = ?t.shape, "Skipping resize of non-image tensor"),
            }
        }
        step
    }
}

impl Transform for ResizeImages {
    fn name(&self) -> &str {
        "resize_images"
    }

    fn apply(&self, episode: Episode, _ctx: &mut TransformContext<'_>) -> Episode {
        let steps = episode.steps.iter().map(|s| self.resize_step(s)).collect();
        episode.with_steps(steps)
    }
}
