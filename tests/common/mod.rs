//! Shared fixtures for the integration suites.
//!
//! Synthetic episodes are deterministic for a given seed: a 64x64 RGB
//! front camera with random pixels, a 7-dim state, a language instruction
//! and 7-dim actions on every step but the last, sampled at 10 Hz.

#![allow(dead_code)]

use datakit::datakit_core::TensorData;
use datakit::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;

/// Robots assigned round-robin by episode number
pub const ROBOTS: [&str; 3] = ["franka", "widowx", "ur5"];

/// Instructions assigned round-robin by episode number
pub const TASKS: [&str; 3] = ["Pick up the red cup", "open the drawer", "stack the blocks"];

/// Episode id for episode number `i`
pub fn episode_id(i: usize) -> String {
    format!("synthetic_{:06}", i)
}

/// One well-formed episode of `num_steps` steps.
pub fn synthetic_episode(i: usize, num_steps: usize, rng: &mut StdRng) -> Episode {
    let steps = (0..num_steps)
        .map(|t| {
            let pixels: Vec<u8> = (0..64 * 64 * 3).map(|_| rng.gen()).collect();
            let state: Vec<f32> = (0..7).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            let mut step = Step::new(BTreeMap::new())
                .with_observation(
                    "observation.images.front",
                    Tensor::new(vec![64, 64, 3], TensorData::U8(pixels)),
                )
                .with_observation("observation.state", Tensor::vector(state))
                .with_observation("observation.language", TASKS[i % TASKS.len()])
                .with_flags(t == 0, t + 1 == num_steps, t + 1 == num_steps)
                .with_timestamp(t as f64 * 0.1);
            if t + 1 < num_steps {
                let action: Vec<f32> = (0..7).map(|_| rng.gen_range(-1.0f32..1.0) * 0.1).collect();
                step = step.with_action(action);
            }
            step
        })
        .collect();

    let mut episode = Episode::new(episode_id(i), "synthetic", steps);
    episode
        .metadata
        .insert("robot_id".into(), serde_json::json!(ROBOTS[i % ROBOTS.len()]));
    episode
}

/// `n` episodes with lengths between 5 and 12 steps.
pub fn synthetic_episodes(n: usize, seed: u64) -> Vec<Episode> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let len = rng.gen_range(5..=12);
            synthetic_episode(i, len, &mut rng)
        })
        .collect()
}

/// Episode whose action at step 1 is NaN.
pub fn nan_action_episode(i: usize) -> Episode {
    let mut rng = StdRng::seed_from_u64(i as u64);
    let mut episode = synthetic_episode(i, 5, &mut rng);
    if let Some(action) = episode.steps[1].action.as_mut() {
        action[0] = f32::NAN;
    }
    episode
}

/// In-memory source named `synthetic` holding `episodes` in its train split.
pub fn adapter(episodes: Vec<Episode>) -> InMemoryAdapter {
    let mut spec = DatasetSpec::new("synthetic", "synthetic");
    spec.source_uri = "memory://synthetic".into();
    InMemoryAdapter::new(spec, episodes)
}

/// Default configuration with small frames.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.transform.resolution = (16, 16);
    config
}

/// Compile `episodes` into `output` with raw video frames.
pub fn compile(episodes: Vec<Episode>, config: Config, output: &Path) -> (Dataset, CompileResult) {
    Dataset::builder()
        .config(config)
        .raw_video()
        .compile(&mut adapter(episodes), output)
        .expect("compile")
}
