//! Dataset-level schema and provenance.

use crate::episode::{Episode, Metadata};
use crate::keys;
use crate::task_catalog::TaskCatalog;
use crate::value::Value;
use crate::version::CURRENT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape and type of one observation feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Element type name (`uint8`, `float32`, `string`, ...)
    pub dtype: String,
    /// Per-step shape; empty for scalars
    pub shape: Vec<usize>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stored in video shards rather than columnar rows
    #[serde(default)]
    pub is_video: bool,
}

impl FeatureSpec {
    /// Feature with the given dtype and shape.
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>) -> Self {
        FeatureSpec {
            dtype: dtype.into(),
            shape,
            description: None,
            is_video: false,
        }
    }

    /// Infer a spec from a sample value. Image keys become video features.
    pub fn infer(key: &str, value: &Value) -> Self {
        let (dtype, shape) = match value {
            Value::Tensor(t) => (t.dtype().as_str().to_string(), t.shape.clone()),
            other => (other.type_name().to_string(), Vec::new()),
        };
        FeatureSpec {
            dtype,
            shape,
            description: None,
            is_video: keys::is_image_key(key),
        }
    }
}

/// Action-space convention of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSpaceType {
    /// End-effector delta pose + gripper (7 dims)
    #[default]
    EeDelta7,
    /// Absolute end-effector pose + gripper (7 dims)
    EeAbs7,
    /// End-effector velocity + gripper (7 dims)
    EeVelocity7,
    /// Joint deltas, arbitrary arity
    JointDeltaN,
    /// Absolute joint positions, arbitrary arity
    JointAbsN,
    /// Anything else
    Custom,
}

impl ActionSpaceType {
    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSpaceType::EeDelta7 => "ee_delta_7",
            ActionSpaceType::EeAbs7 => "ee_abs_7",
            ActionSpaceType::EeVelocity7 => "ee_velocity_7",
            ActionSpaceType::JointDeltaN => "joint_delta_n",
            ActionSpaceType::JointAbsN => "joint_abs_n",
            ActionSpaceType::Custom => "custom",
        }
    }

    /// Parse a serialized name
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "ee_delta_7" => ActionSpaceType::EeDelta7,
            "ee_abs_7" => ActionSpaceType::EeAbs7,
            "ee_velocity_7" => ActionSpaceType::EeVelocity7,
            "joint_delta_n" => ActionSpaceType::JointDeltaN,
            "joint_abs_n" => ActionSpaceType::JointAbsN,
            "custom" => ActionSpaceType::Custom,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ActionSpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_control_rate() -> f64 {
    10.0
}

fn default_schema_version() -> String {
    CURRENT_SCHEMA_VERSION.to_string()
}

/// Schema and provenance for one dataset build.
///
/// Produced by an adapter's `probe`, enriched by the compiler (build id,
/// transform pipeline) and read by transforms, validators and the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Stable dataset identifier
    pub dataset_id: String,
    /// Display name; written into index rows
    pub dataset_name: String,
    /// Observation key -> feature spec
    #[serde(default)]
    pub observation_schema: BTreeMap<String, FeatureSpec>,
    /// Action feature spec
    #[serde(default)]
    pub action_schema: Option<FeatureSpec>,
    /// Control frequency in Hz
    #[serde(default = "default_control_rate")]
    pub control_rate_hz: f64,
    /// Action-space convention
    #[serde(default)]
    pub action_space_type: ActionSpaceType,
    /// Camera names present in the source
    #[serde(default)]
    pub camera_names: Vec<String>,
    /// Camera chosen as canonical, if any
    #[serde(default)]
    pub canonical_camera: Option<String>,
    /// Task text <-> id mapping
    #[serde(default)]
    pub task_catalog: TaskCatalog,
    /// Where the source data came from
    #[serde(default)]
    pub source_uri: String,
    /// Build that produced this spec
    #[serde(default)]
    pub build_id: Option<String>,
    /// Ordered transform names applied to every episode
    #[serde(default)]
    pub transform_pipeline: Vec<String>,
    /// Output schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Everything else (`robot_type`, source-specific keys)
    #[serde(default)]
    pub extra_metadata: Metadata,
}

impl DatasetSpec {
    /// Spec with defaults for everything but identity.
    pub fn new(dataset_id: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        DatasetSpec {
            dataset_id: dataset_id.into(),
            dataset_name: dataset_name.into(),
            observation_schema: BTreeMap::new(),
            action_schema: None,
            control_rate_hz: default_control_rate(),
            action_space_type: ActionSpaceType::default(),
            camera_names: Vec::new(),
            canonical_camera: None,
            task_catalog: TaskCatalog::new(),
            source_uri: String::new(),
            build_id: None,
            transform_pipeline: Vec::new(),
            schema_version: default_schema_version(),
            extra_metadata: Metadata::new(),
        }
    }

    /// `extra_metadata.robot_type`, or `"unknown"`.
    pub fn robot_type(&self) -> &str {
        self.extra_metadata
            .get("robot_type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }

    /// Fill `observation_schema` and `action_schema` from the first step of
    /// `episode`. Keys already declared are left untouched.
    pub fn infer_schema(&mut self, episode: &Episode) {
        let Some(first) = episode.steps.first() else {
            return;
        };
        for (key, value) in &first.observation {
            self.observation_schema
                .entry(key.clone())
                .or_insert_with(|| FeatureSpec::infer(key, value));
        }
        if self.action_schema.is_none() {
            if let Some(action) = episode.actions().next() {
                self.action_schema = Some(FeatureSpec::new("float32", vec![action.len()]));
            }
        }
        if self.camera_names.is_empty() {
            self.camera_names = episode.camera_names();
        }
    }

    /// Non-video observation features, in key order.
    pub fn row_features(&self) -> impl Iterator<Item = (&String, &FeatureSpec)> {
        self.observation_schema.iter().filter(|(_, f)| !f.is_video)
    }

    /// Video features, in key order.
    pub fn video_features(&self) -> impl Iterator<Item = (&String, &FeatureSpec)> {
        self.observation_schema.iter().filter(|(_, f)| f.is_video)
    }
}
