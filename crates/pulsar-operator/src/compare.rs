//! Desired vs observed comparison for managed resources
//!
//! The default mode is a derivative comparison: every field the operator
//! sets must match, and fields only the cluster populates (defaulted
//! strategy, progress deadline, termination policies, ...) are ignored.
//! A field counts as unset when it is absent, `null`, an empty string or an
//! empty map. A desired list must be a prefix of the observed one, so
//! entries appended by admission webhooks (sidecars, injected env) are not
//! drift.

use crate::error::Result;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use serde::Serialize;
use serde_json::Value;

/// How desired and observed objects are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Fields set in the desired object must match; the rest is ignored
    #[default]
    Derivative,
    /// Full structural equality
    Strict,
}

impl ComparisonMode {
    /// Whether `observed` satisfies `desired` under this mode
    pub fn matches(self, desired: &Value, observed: &Value) -> bool {
        match self {
            ComparisonMode::Derivative => is_derivative(desired, observed),
            ComparisonMode::Strict => desired == observed,
        }
    }
}

/// Whether the observed Deployment spec must be overwritten
pub fn needs_update(desired: &DeploymentSpec, observed: &DeploymentSpec) -> Result<bool> {
    needs_update_with(ComparisonMode::Derivative, desired, observed)
}

/// Whether `observed` must be overwritten with `desired` under `mode`
pub fn needs_update_with<T: Serialize>(
    mode: ComparisonMode,
    desired: &T,
    observed: &T,
) -> Result<bool> {
    let desired = serde_json::to_value(desired)?;
    let observed = serde_json::to_value(observed)?;
    Ok(!mode.matches(&desired, &observed))
}

fn is_derivative(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::String(d), _) if d.is_empty() => true,
        (Value::Object(d), _) if d.is_empty() => true,
        (Value::Object(d), Value::Object(o)) => d.iter().all(|(key, dv)| match o.get(key) {
            Some(ov) => is_derivative(dv, ov),
            None => is_derivative(dv, &Value::Null),
        }),
        (Value::Array(d), Value::Array(o)) => {
            d.len() <= o.len() && d.iter().zip(o).all(|(dv, ov)| is_derivative(dv, ov))
        }
        (Value::Array(d), Value::Null) => d.is_empty(),
        (d, o) => d == o,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn desired_spec(replicas: i32) -> DeploymentSpec {
        let labels = BTreeMap::from([("pulsarcrd".to_string(), "orders-pulsarcrd".to_string())]);
        DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "pulsarconsumer".to_string(),
                        image: Some("krvarma/pulsarconsumer:latest".to_string()),
                        env: Some(vec![EnvVar {
                            name: "PULSAR_TOPIC".to_string(),
                            value: Some("t1".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }
    }

    /// The same spec after the API server filled in its defaults
    fn defaulted(mut spec: DeploymentSpec) -> DeploymentSpec {
        spec.progress_deadline_seconds = Some(600);
        spec.revision_history_limit = Some(10);
        spec.strategy = Some(k8s_openapi::api::apps::v1::DeploymentStrategy {
            type_: Some("RollingUpdate".to_string()),
            ..Default::default()
        });
        if let Some(pod) = spec.template.spec.as_mut() {
            pod.restart_policy = Some("Always".to_string());
            pod.dns_policy = Some("ClusterFirst".to_string());
            pod.termination_grace_period_seconds = Some(30);
            for container in &mut pod.containers {
                container.image_pull_policy = Some("Always".to_string());
                container.termination_message_path = Some("/dev/termination-log".to_string());
            }
        }
        spec
    }

    #[test]
    fn test_identical_specs_need_no_update() {
        let spec = desired_spec(3);
        assert!(!needs_update(&spec, &spec).unwrap());
    }

    #[test]
    fn test_cluster_defaults_ignored() {
        let desired = desired_spec(3);
        let observed = defaulted(desired_spec(3));
        assert!(!needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_replica_drift_needs_update() {
        let desired = desired_spec(5);
        let observed = defaulted(desired_spec(2));
        assert!(needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_zero_replicas_is_not_unset() {
        let desired = desired_spec(0);
        let mut observed = desired_spec(0);
        observed.replicas = None;
        assert!(needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_env_value_drift_needs_update() {
        let desired = desired_spec(3);
        let mut observed = desired_spec(3);
        observed.template.spec.as_mut().unwrap().containers[0]
            .env
            .as_mut()
            .unwrap()[0]
            .value = Some("t2".to_string());
        assert!(needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_injected_sidecar_ignored() {
        let desired = desired_spec(3);
        let mut observed = defaulted(desired_spec(3));
        observed
            .template
            .spec
            .as_mut()
            .unwrap()
            .containers
            .push(Container {
                name: "istio-proxy".to_string(),
                ..Default::default()
            });
        assert!(!needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_injected_env_var_ignored() {
        let desired = desired_spec(3);
        let mut observed = desired_spec(3);
        observed.template.spec.as_mut().unwrap().containers[0]
            .env
            .as_mut()
            .unwrap()
            .push(EnvVar {
                name: "INJECTED".to_string(),
                value: Some("1".to_string()),
                ..Default::default()
            });
        assert!(!needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_missing_container_needs_update() {
        let desired = desired_spec(3);
        let mut observed = desired_spec(3);
        observed.template.spec.as_mut().unwrap().containers.clear();
        assert!(needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_reordered_containers_need_update() {
        let desired = desired_spec(3);
        let mut observed = desired_spec(3);
        observed
            .template
            .spec
            .as_mut()
            .unwrap()
            .containers
            .insert(
                0,
                Container {
                    name: "istio-proxy".to_string(),
                    ..Default::default()
                },
            );
        assert!(needs_update(&desired, &observed).unwrap());
    }

    #[test]
    fn test_missing_observed_spec_needs_update() {
        let desired = desired_spec(3);
        assert!(needs_update(&desired, &DeploymentSpec::default()).unwrap());
    }

    #[test]
    fn test_derivative_values() {
        let mode = ComparisonMode::Derivative;
        assert!(mode.matches(&json!(null), &json!({"a": 1})));
        assert!(mode.matches(&json!(""), &json!("anything")));
        assert!(mode.matches(&json!({}), &json!({"a": 1})));
        assert!(mode.matches(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(mode.matches(&json!({"a": []}), &json!({})));
        assert!(!mode.matches(&json!({"a": 1}), &json!({"b": 1})));
        assert!(!mode.matches(&json!({"a": false}), &json!({})));
        assert!(!mode.matches(&json!([1, 2]), &json!([1])));
        assert!(mode.matches(&json!([1]), &json!([1, 2])));
        assert!(!mode.matches(&json!([2]), &json!([1, 2])));
        assert!(mode.matches(
            &json!({"containers": [{"name": "pulsarconsumer"}]}),
            &json!({"containers": [{"name": "pulsarconsumer"}, {"name": "istio-proxy"}]})
        ));
        assert!(!mode.matches(&json!("x"), &json!("y")));
    }

    #[test]
    fn test_strict_mode_rejects_cluster_defaults() {
        let desired = desired_spec(3);
        let observed = defaulted(desired_spec(3));
        assert!(needs_update_with(ComparisonMode::Strict, &desired, &observed).unwrap());
        assert!(!needs_update_with(ComparisonMode::Strict, &desired, &desired).unwrap());
    }

    #[test]
    fn test_default_mode_is_derivative() {
        assert_eq!(ComparisonMode::default(), ComparisonMode::Derivative);
    }
}
