//! Kubernetes Resource Builders
//!
//! This module generates the consumer Deployment from a PulsarConsumer.
//! Building is a pure transform: no cluster access, and the same resource
//! always yields the same Deployment.

use crate::crd::PulsarConsumer;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Default consumer container image
pub const DEFAULT_CONSUMER_IMAGE: &str = "krvarma/pulsarconsumer:latest";

/// Name of the consumer container in the pod template
pub const CONTAINER_NAME: &str = "pulsarconsumer";

/// Label key tying a Deployment to its owning PulsarConsumer
pub const OWNER_LABEL: &str = "pulsarcrd";

/// Environment variable carrying the Pulsar server address
pub const ENV_SERVER: &str = "PULSAR_SERVER";

/// Environment variable carrying the topic name
pub const ENV_TOPIC: &str = "PULSAR_TOPIC";

/// Environment variable carrying the subscription name
pub const ENV_SUBSCRIPTION: &str = "PULSAR_SUBSCRIPTION_NAME";

/// Settings shared by every Deployment the operator builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Consumer container image
    pub image: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_CONSUMER_IMAGE.to_string(),
        }
    }
}

/// Name of the Deployment managed for the named PulsarConsumer
pub fn deployment_name(consumer_name: &str) -> String {
    format!("{}-deployment", consumer_name)
}

/// Builder for generating Kubernetes resources from a PulsarConsumer
pub struct ResourceBuilder<'a> {
    consumer: &'a PulsarConsumer,
    config: &'a BuilderConfig,
    name: String,
    namespace: String,
}

impl<'a> ResourceBuilder<'a> {
    /// Create a new resource builder
    pub fn new(consumer: &'a PulsarConsumer, config: &'a BuilderConfig) -> Result<Self> {
        let name = consumer.metadata.name.clone().ok_or_else(|| {
            OperatorError::InvalidConfig("PulsarConsumer name is required".to_string())
        })?;

        let namespace = consumer.namespace().unwrap_or_else(|| "default".to_string());

        Ok(Self {
            consumer,
            config,
            name,
            namespace,
        })
    }

    /// Name of the managed Deployment
    pub fn deployment_name(&self) -> String {
        deployment_name(&self.name)
    }

    /// Value of the owner label for this consumer
    fn owner_label_value(&self) -> String {
        format!("{}-pulsarcrd", self.name)
    }

    /// Immutable selector labels
    ///
    /// Only the owner label, so edits to the consumer's own labels never
    /// touch the Deployment selector.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(OWNER_LABEL.to_string(), self.owner_label_value())])
    }

    /// The consumer's labels merged with the owner label, in a fresh map
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.consumer.labels().clone();
        labels.extend(self.selector_labels());
        labels
    }

    /// Controller owner reference pointing back at the PulsarConsumer
    fn owner_reference(&self) -> Result<OwnerReference> {
        let owner = self.consumer.controller_owner_ref(&()).ok_or_else(|| {
            OperatorError::OwnerReference(format!(
                "{} {}/{} has no uid",
                PulsarConsumer::kind(&()),
                self.namespace,
                self.name
            ))
        })?;

        Ok(OwnerReference {
            block_owner_deletion: Some(true),
            ..owner
        })
    }

    /// Build the consumer container
    fn build_container(&self) -> Container {
        let spec = &self.consumer.spec;

        let env = vec![
            EnvVar {
                name: ENV_SERVER.to_string(),
                value: Some(spec.server_address.clone()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_TOPIC.to_string(),
                value: Some(spec.topic.clone()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_SUBSCRIPTION.to_string(),
                value: Some(spec.subscription_name.clone()),
                ..Default::default()
            },
        ];

        Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(self.config.image.clone()),
            env: Some(env),
            ..Default::default()
        }
    }

    /// Build the Deployment for the consumer workers
    pub fn build_deployment(&self) -> Result<Deployment> {
        let labels = self.labels();

        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(self.deployment_name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                owner_references: Some(vec![self.owner_reference()?]),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(self.consumer.spec.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![self.build_container()],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
