//! Image integrity and cross-step alignment.

use crate::finding::Finding;
use crate::runner::Validator;
use datakit_core::{keys, DType, DatasetSpec, Episode, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-frame image checks.
///
/// | Code | Severity | Condition |
/// |------|----------|-----------|
/// | E040 | ERROR | value under an image key is not a tensor |
/// | W040 | WARN | dtype differs from `expected_dtype` |
/// | E041 | ERROR | ndim not 2 or 3 |
/// | E042 | ERROR | a zero-length dimension |
/// | E043 | ERROR | NaN/Inf in a float image |
/// | E044 | ERROR | buffer length does not match the shape |
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageIntegrityValidator {
    /// Expected pixel type
    pub expected_dtype: DType,
}

impl Default for ImageIntegrityValidator {
    fn default() -> Self {
        ImageIntegrityValidator {
            expected_dtype: DType::Uint8,
        }
    }
}

impl ImageIntegrityValidator {
    fn check(&self, key: &str, value: &Value, step: usize, findings: &mut Vec<Finding>) {
        let Value::Tensor(t) = value else {
            findings.push(
                Finding::error("E040", format!("image {} is a {}, not a tensor", key, value.type_name()))
                    .at_step(step)
                    .on_field(key),
            );
            return;
        };

        if t.dtype() != self.expected_dtype {
            findings.push(
                Finding::warn(
                    "W040",
                    format!("image {} dtype {} != {}", key, t.dtype(), self.expected_dtype),
                )
                .at_step(step)
                .on_field(key),
            );
        }
        if !matches!(t.ndim(), 2 | 3) {
            findings.push(
                Finding::error("E041", format!("image {} has invalid ndim={}", key, t.ndim()))
                    .at_step(step)
                    .on_field(key),
            );
        } else if t.shape.contains(&0) {
            findings.push(
                Finding::error("E042", format!("image {} has zero dimension: {:?}", key, t.shape))
                    .at_step(step)
                    .on_field(key),
            );
        } else if t.numel() != t.data.len() {
            findings.push(
                Finding::error(
                    "E044",
                    format!("image {} holds {} values for shape {:?}", key, t.data.len(), t.shape),
                )
                .at_step(step)
                .on_field(key),
            );
        }
        if t.dtype().is_float() && t.data.has_non_finite() {
            findings.push(
                Finding::error("E043", format!("image {} contains NaN/Inf", key))
                    .at_step(step)
                    .on_field(key),
            );
        }
    }
}

impl Validator for ImageIntegrityValidator {
    fn name(&self) -> &str {
        "image_integrity"
    }

    fn validate(&self, episode: &Episode, _spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (i, step) in episode.steps.iter().enumerate() {
            for (key, value) in &step.observation {
                if keys::is_image_key(key) {
                    self.check(key, value, i, &mut findings);
                }
            }
        }
        findings
    }
}

/// Cross-step camera consistency against step 0.
///
/// Missing camera key: ERROR (E050). Extra camera key: WARN (W050).
/// Shape differs from step 0: ERROR (E051).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAlignmentValidator;

impl Validator for ImageAlignmentValidator {
    fn name(&self) -> &str {
        "image_alignment"
    }

    fn validate(&self, episode: &Episode, _spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        let Some(first) = episode.steps.first() else {
            return findings;
        };

        let reference: BTreeSet<&str> = first
            .observation
            .keys()
            .map(String::as_str)
            .filter(|k| keys::is_image_key(k))
            .collect();
        if reference.is_empty() {
            return findings;
        }
        let ref_shapes: BTreeMap<&str, &[usize]> = reference
            .iter()
            .filter_map(|k| {
                first.observation[*k]
                    .as_tensor()
                    .map(|t| (*k, t.shape.as_slice()))
            })
            .collect();

        for (i, step) in episode.steps.iter().enumerate().skip(1) {
            let present: BTreeSet<&str> = step
                .observation
                .keys()
                .map(String::as_str)
                .filter(|k| keys::is_image_key(k))
                .collect();

            for key in reference.difference(&present) {
                findings.push(
                    Finding::error("E050", format!("missing image {} at step {}", key, i))
                        .at_step(i)
                        .on_field(*key),
                );
            }
            for key in present.difference(&reference) {
                findings.push(
                    Finding::warn("W050", format!("extra image {} at step {}", key, i))
                        .at_step(i)
                        .on_field(*key),
                );
            }
            for key in reference.intersection(&present) {
                let (Some(expected), Some(t)) =
                    (ref_shapes.get(key), step.observation[*key].as_tensor())
                else {
                    continue;
                };
                if t.shape.as_slice() != *expected {
                    findings.push(
                        Finding::error(
                            "E051",
                            format!("shape mismatch for {}: {:?} != {:?}", key, t.shape, expected),
                        )
                        .at_step(i)
                        .on_field(*key),
                    );
                }
            }
        }
        findings
    }
}
