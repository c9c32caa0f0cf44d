//! Compilation configuration.
//!
//! ## Design
//!
//! [`Config`] is a plain serde tree. Every field has a default, so a partial
//! JSON document deserializes into a complete configuration. Reading the
//! document from disk is left to the caller.
//!
//! | Section | Feeds |
//! |---------|-------|
//! | `validation` | [`RunnerOptions`] and the default validator stages |
//! | `sharding` | [`WriterOptions`] and the video encoder |
//! | `transform` | the default transform stages |
//! | `dataset_overrides` | [`Config::for_dataset`] |
//!
//! [`Config::hash`] identifies a configuration in the run manifest: the
//! first 16 hex characters of the SHA-256 of its canonical JSON (object keys
//! sorted, no whitespace).

use datakit_core::{ConfigError, SplitRatios};
use datakit_storage::{FfmpegEncoderFactory, WriterOptions};
use datakit_transform::ActionLayout;
use datakit_validate::{RunnerOptions, Severity, ValidationMode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Validation behaviour and validator thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Stop at the first rejected episode
    pub fail_fast: bool,
    /// With `fail_fast`, WARN stops the run too
    pub fail_on_warn: bool,
    /// Flag failing episodes as quarantined
    pub quarantine: bool,
    /// Shorthand for `fail_fast` + `fail_on_warn`
    pub strict: bool,
    /// Minimum steps per episode
    pub min_episode_length: usize,
    /// Steps above which an episode is flagged
    pub max_episode_length: usize,
    /// Inclusive `(min, max)` for every action component
    pub action_bounds: (f32, f32),
    /// Z-score outlier threshold
    pub action_sigma_threshold: f64,
    /// Allowed timestamp gap in control periods
    pub timestamp_gap_factor: f64,
    /// Rule code -> replacement severity
    pub severity_overrides: BTreeMap<String, Severity>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            fail_fast: false,
            fail_on_warn: false,
            quarantine: false,
            strict: false,
            min_episode_length: 1,
            max_episode_length: 100_000,
            action_bounds: (-10.0, 10.0),
            action_sigma_threshold: 5.0,
            timestamp_gap_factor: 2.0,
            severity_overrides: BTreeMap::new(),
        }
    }
}

/// Shard sizes and video encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Episodes per chunk directory
    pub episodes_per_chunk: usize,
    /// Rows buffered before a columnar shard is flushed
    pub rows_per_shard: usize,
    /// Frame budget of one video shard
    pub max_video_frames_per_shard: u64,
    /// x264 constant rate factor
    pub video_crf: u32,
    /// x264 preset
    pub video_preset: String,
    /// Give up on an encoder that has not exited this long after its input
    /// was closed. No limit when unset.
    pub encoder_timeout_secs: Option<f64>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        ShardingConfig {
            episodes_per_chunk: 1000,
            rows_per_shard: 10_000,
            max_video_frames_per_shard: 10_000,
            video_crf: 23,
            video_preset: "medium".to_string(),
            encoder_timeout_secs: None,
        }
    }
}

/// Parameters of the default transform stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Camera to expose as the canonical view; `None` uses the fallback order
    pub camera: Option<String>,
    /// Preference order when `camera` is unset or missing
    pub camera_fallback_order: Vec<String>,
    /// Target `(height, width)` of every image
    pub resolution: (usize, usize),
    /// Target action layout; `None` leaves actions as they are
    pub action_mapping: Option<ActionLayout>,
    /// Rescale actions into `[-1, 1]`
    pub normalize_actions: bool,
    /// Task text for episodes that carry none
    pub default_task_text: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            camera: None,
            camera_fallback_order: datakit_transform::DEFAULT_FALLBACK_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resolution: (256, 256),
            action_mapping: None,
            normalize_actions: false,
            default_task_text: String::new(),
        }
    }
}

/// Top-level configuration of a compilation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Requested worker count; runs are serial, values above 1 are logged
    pub workers: usize,
    /// Seed for split assignment
    pub seed: u64,
    /// Requested resume of a previous build; not supported, logged
    pub resume: bool,
    /// Train/val ratios; test takes the rest
    pub split: SplitRatios,
    /// Validation section
    pub validation: ValidationConfig,
    /// Sharding section
    pub sharding: ShardingConfig,
    /// Transform section
    pub transform: TransformConfig,
    /// Dataset name -> partial config merged over this one
    pub dataset_overrides: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workers: 1,
            seed: 42,
            resume: false,
            split: SplitRatios::default(),
            validation: ValidationConfig::default(),
            sharding: ShardingConfig::default(),
            transform: TransformConfig::default(),
            dataset_overrides: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parse a JSON document; omitted fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.split.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "split ratios out of range: train={} val={}",
                self.split.train, self.split.val
            )));
        }
        let v = &self.validation;
        if v.min_episode_length > v.max_episode_length {
            return Err(ConfigError::Invalid(format!(
                "min_episode_length {} exceeds max_episode_length {}",
                v.min_episode_length, v.max_episode_length
            )));
        }
        if v.action_bounds.0 > v.action_bounds.1 {
            return Err(ConfigError::Invalid(format!(
                "action_bounds {:?} are inverted",
                v.action_bounds
            )));
        }
        let s = &self.sharding;
        if s.episodes_per_chunk == 0 || s.rows_per_shard == 0 || s.max_video_frames_per_shard == 0 {
            return Err(ConfigError::Invalid("shard sizes must be positive".into()));
        }
        if s.encoder_timeout_secs.is_some_and(|t| t.is_nan() || t <= 0.0) {
            return Err(ConfigError::Invalid("encoder_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// This config with `dataset_overrides[name]` merged in.
    ///
    /// Object-valued sections are merged key by key; any other value
    /// replaces the current one. Without an override for `name` the result
    /// is a copy of `self`.
    pub fn for_dataset(&self, name: &str) -> Result<Config, ConfigError> {
        let Some(overrides) = self.dataset_overrides.get(name) else {
            return Ok(self.clone());
        };
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(ConfigError::Invalid(format!(
                "override for dataset '{name}' is not an object"
            )));
        };
        let mut base = serde_json::to_value(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let serde_json::Value::Object(base) = &mut base {
            for (key, value) in overrides {
                match (base.get_mut(key), value) {
                    (Some(serde_json::Value::Object(section)), serde_json::Value::Object(patch)) => {
                        for (k, v) in patch {
                            section.insert(k.clone(), v.clone());
                        }
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        let merged: Config =
            serde_json::from_value(base).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Canonical JSON: sorted keys, no whitespace.
    pub fn canonical_json(&self) -> Result<String, ConfigError> {
        // Value maps are ordered, so re-serializing a Value sorts every object
        let value = serde_json::to_value(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        serde_json::to_string(&value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// First 16 hex characters of the SHA-256 of [`canonical_json`](Self::canonical_json).
    pub fn hash(&self) -> Result<String, ConfigError> {
        let digest = Sha256::digest(self.canonical_json()?.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Ok(hex[..16].to_string())
    }

    /// Runner options for the `validation` section.
    pub fn runner_options(&self) -> RunnerOptions {
        let v = &self.validation;
        let mode = if v.fail_fast || v.strict {
            ValidationMode::FailFast
        } else if v.quarantine {
            ValidationMode::Quarantine
        } else {
            ValidationMode::Collect
        };
        RunnerOptions {
            mode,
            fail_on_warn: v.fail_on_warn || v.strict,
            severity_overrides: v.severity_overrides.clone(),
        }
    }

    /// Writer options for the `sharding` section and split settings.
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            episodes_per_chunk: self.sharding.episodes_per_chunk,
            rows_per_shard: self.sharding.rows_per_shard,
            max_video_frames_per_shard: self.sharding.max_video_frames_per_shard,
            split_seed: self.seed,
            split_ratios: self.split,
        }
    }

    /// ffmpeg encoder for the `sharding` section.
    pub fn encoder(&self) -> FfmpegEncoderFactory {
        let factory = FfmpegEncoderFactory::new(self.sharding.video_crf, self.sharding.video_preset.clone());
        match self.sharding.encoder_timeout_secs {
            Some(secs) => factory.with_finish_timeout(Duration::from_secs_f64(secs)),
            None => factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.workers, 1);
        assert_eq!(c.seed, 42);
        assert_eq!(c.sharding.episodes_per_chunk, 1000);
        assert_eq!(c.sharding.video_preset, "medium");
        assert_eq!(c.validation.action_bounds, (-10.0, 10.0));
        assert_eq!(c.split.train, 0.8);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c = Config::from_json(r#"{"seed": 7, "validation": {"fail_fast": true}}"#).unwrap();
        assert_eq!(c.seed, 7);
        assert!(c.validation.fail_fast);
        assert_eq!(c.validation.max_episode_length, 100_000);
        assert_eq!(c.runner_options().mode, ValidationMode::FailFast);
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::default();
        assert_eq!(a.hash().unwrap(), Config::default().hash().unwrap());
        assert_eq!(a.hash().unwrap().len(), 16);
        let mut b = a.clone();
        b.seed = 43;
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_for_dataset_merges_sections() {
        let mut c = Config::default();
        c.dataset_overrides.insert(
            "bridge".into(),
            json!({"seed": 1, "sharding": {"rows_per_shard": 50}}),
        );
        let merged = c.for_dataset("bridge").unwrap();
        assert_eq!(merged.seed, 1);
        assert_eq!(merged.sharding.rows_per_shard, 50);
        assert_eq!(merged.sharding.episodes_per_chunk, 1000);
        assert_eq!(c.for_dataset("other").unwrap(), c);
    }

    #[test]
    fn test_strict_implies_fail_on_warn() {
        let mut c = Config::default();
        c.validation.strict = true;
        let o = c.runner_options();
        assert_eq!(o.mode, ValidationMode::FailFast);
        assert!(o.fail_on_warn);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut c = Config::default();
        c.validation.min_episode_length = 10;
        c.validation.max_episode_length = 5;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = Config::default();
        c.split = SplitRatios { train: 0.9, val: 0.3 };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_severity_override_round_trip() {
        let c = Config::from_json(r#"{"validation": {"severity_overrides": {"W010": "ERROR"}}}"#).unwrap();
        assert_eq!(c.runner_options().severity_overrides.get("W010"), Some(&Severity::Error));
    }
}
