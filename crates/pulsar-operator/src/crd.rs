//! Custom Resource Definition for the PulsarConsumer operator
//!
//! A `PulsarConsumer` declares a set of replicated consumer processes reading
//! one Pulsar topic through one subscription. The operator materializes it
//! as a Deployment and mirrors the applied values into the status.

use crate::error::Result;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// PulsarConsumer custom resource definition
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "pulsar.pulsarconsumer.krvarma.com",
    version = "v1",
    kind = "PulsarConsumer",
    plural = "pulsarconsumers",
    shortname = "pcon",
    namespaced,
    status = "PulsarConsumerStatus",
    printcolumn = r#"{"name":"Server", "type":"string", "jsonPath":".status.server"}"#,
    printcolumn = r#"{"name":"Topic", "type":"string", "jsonPath":".status.topic"}"#,
    printcolumn = r#"{"name":"Subscription", "type":"string", "jsonPath":".status.subscription"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PulsarConsumerSpec {
    /// Address of the Pulsar server (e.g. `pulsar://broker:6650`)
    #[validate(length(min = 1, message = "serverAddress must not be empty"))]
    #[schemars(length(min = 1))]
    pub server_address: String,

    /// Name of the topic to consume
    #[validate(length(min = 1, message = "topic must not be empty"))]
    #[schemars(length(min = 1))]
    pub topic: String,

    /// Name of the subscription
    #[validate(length(min = 1, message = "subscriptionName must not be empty"))]
    #[schemars(length(min = 1))]
    pub subscription_name: String,

    /// Number of consumer replicas
    #[validate(range(min = 0, message = "replicas must not be negative"))]
    #[schemars(range(min = 0))]
    pub replicas: i32,
}

/// Observed state of a PulsarConsumer
///
/// Written only by the operator, after the cluster has accepted the
/// Deployment carrying these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PulsarConsumerStatus {
    /// Server address of the last applied spec
    pub server: String,

    /// Topic of the last applied spec
    pub topic: String,

    /// Subscription of the last applied spec
    pub subscription: String,

    /// Replica count of the last applied spec
    pub replicas: i32,
}

impl PulsarConsumerStatus {
    /// Status mirroring the given spec
    pub fn from_spec(spec: &PulsarConsumerSpec) -> Self {
        Self {
            server: spec.server_address.clone(),
            topic: spec.topic.clone(),
            subscription: spec.subscription_name.clone(),
            replicas: spec.replicas,
        }
    }
}

impl PulsarConsumerSpec {
    /// Validate the spec and flatten all field errors into one message
    pub fn validation_errors(&self) -> Option<String> {
        let errors = self.validate().err()?;
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        Some(messages.join("; "))
    }
}

/// Render the CRD manifest as YAML
pub fn crd_yaml() -> Result<String> {
    Ok(serde_yaml::to_string(&PulsarConsumer::crd())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> PulsarConsumerSpec {
        PulsarConsumerSpec {
            server_address: "pulsar://broker:6650".to_string(),
            topic: "orders".to_string(),
            subscription_name: "orders-sub".to_string(),
            replicas: 2,
        }
    }

    #[test]
    fn test_spec_wire_names() {
        let json = serde_json::to_value(valid_spec()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "serverAddress": "pulsar://broker:6650",
                "topic": "orders",
                "subscriptionName": "orders-sub",
                "replicas": 2
            })
        );
    }

    #[test]
    fn test_status_from_spec() {
        let status = PulsarConsumerStatus::from_spec(&valid_spec());
        assert_eq!(status.server, "pulsar://broker:6650");
        assert_eq!(status.topic, "orders");
        assert_eq!(status.subscription, "orders-sub");
        assert_eq!(status.replicas, 2);
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(valid_spec().validation_errors().is_none());
    }

    #[test]
    fn test_zero_replicas_allowed() {
        let spec = PulsarConsumerSpec {
            replicas: 0,
            ..valid_spec()
        };
        assert!(spec.validation_errors().is_none());
    }

    #[test]
    fn test_invalid_spec_reports_every_field() {
        let spec = PulsarConsumerSpec {
            server_address: String::new(),
            topic: String::new(),
            subscription_name: "sub".to_string(),
            replicas: -1,
        };
        let message = spec.validation_errors().unwrap();
        assert!(message.contains("serverAddress must not be empty"));
        assert!(message.contains("topic must not be empty"));
        assert!(message.contains("replicas must not be negative"));
        assert!(!message.contains("subscriptionName"));
    }

    #[test]
    fn test_crd_yaml() {
        let yaml = crd_yaml().unwrap();
        assert!(yaml.contains("pulsarconsumers.pulsar.pulsarconsumer.krvarma.com"));
        assert!(yaml.contains("kind: PulsarConsumer"));
    }
}
