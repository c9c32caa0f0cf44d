//! Observation schema conformance.

use crate::finding::Finding;
use crate::runner::Validator;
use datakit_core::{DatasetSpec, Episode, Value};
use std::collections::BTreeSet;

/// Checks steps against `DatasetSpec::observation_schema`.
///
/// - W060: a declared key is missing at a non-last step (once per key)
/// - W061: a value's dtype differs from the declared dtype (once per key)
/// - E060: the observation key set changes between non-last steps
///
/// The last step may drop keys; RLDS sources often do.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

fn dtype_of(value: &Value) -> &'static str {
    match value {
        Value::Tensor(t) => t.dtype().as_str(),
        other => other.type_name(),
    }
}

impl Validator for SchemaValidator {
    fn name(&self) -> &str {
        "schema"
    }

    fn validate(&self, episode: &Episode, spec: &DatasetSpec) -> Vec<Finding> {
        let mut findings = Vec::new();
        let n = episode.steps.len();
        let body = &episode.steps[..n.saturating_sub(1)];

        let mut reported_missing = BTreeSet::new();
        let mut reported_dtype = BTreeSet::new();
        for (i, step) in body.iter().enumerate() {
            for (key, feature) in &spec.observation_schema {
                match step.observation.get(key) {
                    None => {
                        if reported_missing.insert(key.as_str()) {
                            findings.push(
                                Finding::warn("W060", format!("declared feature {} missing", key))
                                    .at_step(i)
                                    .on_field(key.as_str()),
                            );
                        }
                    }
                    Some(value) => {
                        let actual = dtype_of(value);
                        if !feature.dtype.is_empty()
                            && feature.dtype != actual
                            && reported_dtype.insert(key.as_str())
                        {
                            findings.push(
                                Finding::warn(
                                    "W061",
                                    format!("feature {} has dtype {}, declared {}", key, actual, feature.dtype),
                                )
                                .at_step(i)
                                .on_field(key.as_str()),
                            );
                        }
                    }
                }
            }
        }

        if let Some(first) = body.first() {
            let reference = first.observation_keys();
            if let Some((i, _)) = body
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, s)| s.observation_keys() != reference)
            {
                findings.push(
                    Finding::error("E060", format!("observation keys at step {} differ from step 0", i))
                        .at_step(i),
                );
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_core::{FeatureSpec, Step, Tensor};

    fn spec() -> DatasetSpec {
        let mut spec = DatasetSpec::new("d", "d");
        spec.observation_schema
            .insert("observation.state".into(), FeatureSpec::new("float32", vec![2]));
        spec
    }

    fn step(state: Option<Value>) -> Step {
        let mut s = Step::default();
        if let Some(v) = state {
            s.observation.insert("observation.state".into(), v);
        }
        s
    }

    #[test]
    fn test_conforming_episode() {
        let state = || Some(Tensor::vector(vec![0.0, 1.0]).into());
        // last step without the key is allowed
        let ep = Episode::new("e", "d", vec![step(state()), step(state()), step(None)]);
        assert!(SchemaValidator.validate(&ep, &spec()).is_empty());
    }

    #[test]
    fn test_missing_and_dtype() {
        let ep = Episode::new(
            "e",
            "d",
            vec![
                step(Some(Value::Float(1.0))),
                step(None),
                step(Some(Value::Float(1.0))),
                step(None),
            ],
        );
        let findings = SchemaValidator.validate(&ep, &spec());
        let codes: Vec<&str> = findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["W061", "W060", "E060"]);
        assert_eq!(findings[1].step_index, Some(1));
    }
}
