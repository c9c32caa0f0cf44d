//! Name -> constructor registry for pipeline stages.
//!
//! ## Design
//!
//! A pipeline is described as data, a [`PipelineSpec`] of `{name, params}`
//! stages, and turned into a [`TransformChain`] and a [`ValidationRunner`]
//! by a [`Registry`]. Construction fails before any episode is read:
//!
//! | Problem | Error |
//! |---------|-------|
//! | transform name not registered | [`ConfigError::UnknownTransform`] |
//! | validator name not registered | [`ConfigError::UnknownValidator`] |
//! | params do not deserialize (unknown field, wrong type) | [`ConfigError::InvalidParams`] |
//!
//! Missing or `null` params mean "all defaults". Stages without parameters
//! accept `null` or `{}` only.

use crate::config::Config;
use datakit_core::ConfigError;
use datakit_transform::{
    Identity, MapActionSpace, NormalizeActions, PadAction, Resample, ResizeImages, SelectCamera,
    TaskText, TimestampCanonicalize, Transform, TransformChain,
};
use datakit_validate::{
    ActionSanityValidator, EpisodeLengthValidator, ImageAlignmentValidator,
    ImageIntegrityValidator, RldsInvariantValidator, RunnerOptions, SchemaValidator,
    TimestampValidator, ValidationRunner, Validator,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Registered name
    pub name: String,
    /// Constructor parameters
    #[serde(default)]
    pub params: Value,
}

impl StageSpec {
    /// Stage with default parameters
    pub fn new(name: impl Into<String>) -> Self {
        StageSpec {
            name: name.into(),
            params: Value::Null,
        }
    }

    /// Stage with parameters
    pub fn with_params(name: impl Into<String>, params: Value) -> Self {
        StageSpec {
            name: name.into(),
            params,
        }
    }
}

/// Ordered transform and validator stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSpec {
    /// Applied in order before validation
    pub transforms: Vec<StageSpec>,
    /// Run in order on each transformed episode
    pub validators: Vec<StageSpec>,
}

impl PipelineSpec {
    /// Stages derived from a [`Config`].
    ///
    /// Transforms: camera selection, resize, the optional action mapping and
    /// normalization, then task text. Validators: every built-in check with
    /// the thresholds of the `validation` section.
    pub fn from_config(config: &Config) -> Self {
        let t = &config.transform;
        let v = &config.validation;

        let mut transforms = vec![
            StageSpec::with_params(
                "select_camera",
                json!({"camera": t.camera, "fallback_order": t.camera_fallback_order}),
            ),
            StageSpec::with_params("resize_images", json!({"target_size": t.resolution})),
        ];
        if let Some(layout) = t.action_mapping {
            transforms.push(StageSpec::with_params(
                "map_action_space",
                json!({"target_space": layout}),
            ));
        }
        if t.normalize_actions {
            transforms.push(StageSpec::new("normalize_actions"));
        }
        transforms.push(StageSpec::with_params(
            "task_text",
            json!({"default_text": t.default_task_text}),
        ));

        let validators = vec![
            StageSpec::new("rlds_invariants"),
            StageSpec::with_params(
                "episode_length",
                json!({"min_length": v.min_episode_length, "max_length": v.max_episode_length}),
            ),
            StageSpec::with_params("timestamps", json!({"max_gap_factor": v.timestamp_gap_factor})),
            StageSpec::with_params(
                "action_sanity",
                json!({"bounds": v.action_bounds, "sigma_threshold": v.action_sigma_threshold}),
            ),
            StageSpec::new("image_integrity"),
            StageSpec::new("image_alignment"),
            StageSpec::new("schema"),
        ];

        PipelineSpec { transforms, validators }
    }

    /// Parse a JSON document.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

type TransformFactory = Box<dyn Fn(&Value) -> Result<Box<dyn Transform>, ConfigError> + Send + Sync>;
type ValidatorFactory = Box<dyn Fn(&Value) -> Result<Box<dyn Validator>, ConfigError> + Send + Sync>;

/// Deserialize `params` into `T`, defaults for `null`.
pub fn parse_params<T: DeserializeOwned + Default>(stage: &str, params: &Value) -> Result<T, ConfigError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone()).map_err(|e| ConfigError::InvalidParams {
        stage: stage.to_string(),
        reason: e.to_string(),
    })
}

fn no_params(stage: &str, params: &Value) -> Result<(), ConfigError> {
    match params {
        Value::Null => Ok(()),
        Value::Object(map) if map.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidParams {
            stage: stage.to_string(),
            reason: "stage takes no parameters".to_string(),
        }),
    }
}

/// Registered transform and validator constructors.
pub struct Registry {
    transforms: BTreeMap<String, TransformFactory>,
    validators: BTreeMap<String, ValidatorFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry with every built-in stage.
    pub fn new() -> Self {
        let mut r = Self::empty();

        r.register_transform("identity", |p| {
            no_params("identity", p)?;
            Ok(Box::new(Identity))
        });
        r.register_serde_transform::<SelectCamera>("select_camera");
        r.register_serde_transform::<ResizeImages>("resize_images");
        r.register_serde_transform::<NormalizeActions>("normalize_actions");
        r.register_serde_transform::<PadAction>("pad_action");
        r.register_serde_transform::<MapActionSpace>("map_action_space");
        r.register_serde_transform::<TaskText>("task_text");
        r.register_serde_transform::<TimestampCanonicalize>("timestamp_canonicalize");
        r.register_transform("resample", |p| {
            let t: Resample = parse_params("resample", p)?;
            if !(t.target_rate_hz.is_finite() && t.target_rate_hz > 0.0) {
                return Err(ConfigError::InvalidParams {
                    stage: "resample".into(),
                    reason: format!("target_rate_hz must be positive, got {}", t.target_rate_hz),
                });
            }
            Ok(Box::new(t))
        });

        r.register_validator("rlds_invariants", |p| {
            no_params("rlds_invariants", p)?;
            Ok(Box::new(RldsInvariantValidator))
        });
        r.register_serde_validator::<EpisodeLengthValidator>("episode_length");
        r.register_serde_validator::<TimestampValidator>("timestamps");
        r.register_serde_validator::<ActionSanityValidator>("action_sanity");
        r.register_serde_validator::<ImageIntegrityValidator>("image_integrity");
        r.register_validator("image_alignment", |p| {
            no_params("image_alignment", p)?;
            Ok(Box::new(ImageAlignmentValidator))
        });
        r.register_validator("schema", |p| {
            no_params("schema", p)?;
            Ok(Box::new(SchemaValidator))
        });
        r
    }

    /// Registry with nothing registered
    pub fn empty() -> Self {
        Registry {
            transforms: BTreeMap::new(),
            validators: BTreeMap::new(),
        }
    }

    /// Register (or replace) a transform constructor.
    pub fn register_transform<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Transform>, ConfigError> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Box::new(factory));
        self
    }

    /// Register (or replace) a validator constructor.
    pub fn register_validator<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Validator>, ConfigError> + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Box::new(factory));
        self
    }

    fn register_serde_transform<T>(&mut self, name: &'static str)
    where
        T: Transform + DeserializeOwned + Default + 'static,
    {
        self.register_transform(name, move |p| Ok(Box::new(parse_params::<T>(name, p)?)));
    }

    fn register_serde_validator<V>(&mut self, name: &'static str)
    where
        V: Validator + DeserializeOwned + Default + 'static,
    {
        self.register_validator(name, move |p| Ok(Box::new(parse_params::<V>(name, p)?)));
    }

    /// Registered transform names, sorted
    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.keys().map(String::as_str).collect()
    }

    /// Registered validator names, sorted
    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.keys().map(String::as_str).collect()
    }

    /// Build one transform.
    pub fn transform(&self, stage: &StageSpec) -> Result<Box<dyn Transform>, ConfigError> {
        let factory = self
            .transforms
            .get(&stage.name)
            .ok_or_else(|| ConfigError::UnknownTransform(stage.name.clone()))?;
        factory(&stage.params)
    }

    /// Build one validator.
    pub fn validator(&self, stage: &StageSpec) -> Result<Box<dyn Validator>, ConfigError> {
        let factory = self
            .validators
            .get(&stage.name)
            .ok_or_else(|| ConfigError::UnknownValidator(stage.name.clone()))?;
        factory(&stage.params)
    }

    /// Build the transform chain of `pipeline`.
    pub fn build_chain(&self, pipeline: &PipelineSpec) -> Result<TransformChain, ConfigError> {
        let mut chain = TransformChain::new();
        for stage in &pipeline.transforms {
            chain.add(self.transform(stage)?);
        }
        Ok(chain)
    }

    /// Build a runner with the validators of `pipeline`.
    pub fn build_runner(&self, pipeline: &PipelineSpec, options: RunnerOptions) -> Result<ValidationRunner, ConfigError> {
        let mut runner = ValidationRunner::new(options);
        for stage in &pipeline.validators {
            runner.add(self.validator(stage)?);
        }
        Ok(runner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("transforms", &self.transform_names())
            .field("validators", &self.validator_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let r = Registry::new();
        assert_eq!(r.transform_names().len(), 9);
        assert_eq!(
            r.validator_names(),
            vec![
                "action_sanity",
                "episode_length",
                "image_alignment",
                "image_integrity",
                "rlds_invariants",
                "schema",
                "timestamps"
            ]
        );
    }

    #[test]
    fn test_unknown_names() {
        let r = Registry::new();
        assert_eq!(
            r.transform(&StageSpec::new("flip")).err(),
            Some(ConfigError::UnknownTransform("flip".into()))
        );
        assert_eq!(
            r.validator(&StageSpec::new("vibes")).err(),
            Some(ConfigError::UnknownValidator("vibes".into()))
        );
    }

    #[test]
    fn test_params_are_checked() {
        let r = Registry::new();
        let err = r
            .transform(&StageSpec::with_params("resize_images", json!({"size": [1, 2]})))
            .err();
        assert!(matches!(err, Some(ConfigError::InvalidParams { ref stage, .. }) if stage == "resize_images"));

        let err = r
            .validator(&StageSpec::with_params("rlds_invariants", json!({"strict": true})))
            .err();
        assert!(matches!(err, Some(ConfigError::InvalidParams { .. })));

        let err = r
            .transform(&StageSpec::with_params("resample", json!({"target_rate_hz": 0.0})))
            .err();
        assert!(matches!(err, Some(ConfigError::InvalidParams { .. })));
    }

    #[test]
    fn test_params_reach_the_stage() {
        let r = Registry::new();
        let v = r
            .validator(&StageSpec::with_params("episode_length", json!({"min_length": 3})))
            .unwrap();
        assert_eq!(v.name(), "episode_length");
        let t = r
            .transform(&StageSpec::with_params("pad_action", json!({"target_dim": 8})))
            .unwrap();
        assert_eq!(t.name(), "pad_action");
    }

    #[test]
    fn test_pipeline_from_config_builds() {
        let mut config = Config::default();
        config.transform.normalize_actions = true;
        let pipeline = PipelineSpec::from_config(&config);
        let r = Registry::new();
        let chain = r.build_chain(&pipeline).unwrap();
        assert_eq!(
            chain.names(),
            vec!["select_camera", "resize_images", "normalize_actions", "task_text"]
        );
        let runner = r.build_runner(&pipeline, config.runner_options()).unwrap();
        assert_eq!(runner.names().len(), 7);
    }

    #[test]
    fn test_pipeline_json() {
        let p = PipelineSpec::from_json(
            r#"{"transforms": [{"name": "identity"}], "validators": [{"name": "episode_length", "params": {"max_length": 10}}]}"#,
        )
        .unwrap();
        assert_eq!(p.transforms[0], StageSpec::new("identity"));
        let runner = Registry::new().build_runner(&p, RunnerOptions::collect()).unwrap();
        assert_eq!(runner.names(), vec!["episode_length"]);
    }
}
