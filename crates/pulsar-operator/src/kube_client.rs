//! Cluster access for the PulsarConsumer controller
//!
//! The reconciler only talks to the API server through [`ConsumerKubeClient`],
//! so tests can count and order every read and write.

use crate::crd::{PulsarConsumer, PulsarConsumerStatus};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Get/create/update operations the reconciler needs from the cluster
///
/// Lookups return `Ok(None)` for a missing object; every other API failure
/// is an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConsumerKubeClient: Send + Sync {
    /// Get a PulsarConsumer by name and namespace
    async fn get_consumer(&self, name: &str, namespace: &str) -> Result<Option<PulsarConsumer>>;

    /// Get a Deployment by name and namespace
    async fn get_deployment(&self, name: &str, namespace: &str) -> Result<Option<Deployment>>;

    /// Create a Deployment
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment>;

    /// Replace a Deployment, guarded by its resourceVersion
    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment>;

    /// Write the status subresource of a PulsarConsumer, guarded by the
    /// resourceVersion of `consumer`
    async fn update_consumer_status(
        &self,
        consumer: &PulsarConsumer,
        status: &PulsarConsumerStatus,
    ) -> Result<()>;
}

/// [`ConsumerKubeClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeConsumerClient {
    client: Client,
}

impl KubeConsumerClient {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConsumerKubeClient for KubeConsumerClient {
    async fn get_consumer(&self, name: &str, namespace: &str) -> Result<Option<PulsarConsumer>> {
        let api: Api<PulsarConsumer> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(consumer) => Ok(Some(consumer)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_deployment(&self, name: &str, namespace: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(deployment) => Ok(Some(deployment)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);

        debug!(name = %deployment.name_any(), "Creating Deployment");

        api.create(&PostParams::default(), deployment)
            .await
            .map_err(OperatorError::from)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let name = deployment.metadata.name.as_ref().ok_or_else(|| {
            OperatorError::InvalidConfig("Deployment missing metadata.name".into())
        })?;

        debug!(
            name = %name,
            resource_version = deployment.metadata.resource_version.as_deref().unwrap_or(""),
            "Replacing Deployment"
        );

        api.replace(name, &PostParams::default(), deployment)
            .await
            .map_err(OperatorError::from)
    }

    async fn update_consumer_status(
        &self,
        consumer: &PulsarConsumer,
        status: &PulsarConsumerStatus,
    ) -> Result<()> {
        let name = consumer.metadata.name.as_ref().ok_or_else(|| {
            OperatorError::InvalidConfig("PulsarConsumer missing metadata.name".into())
        })?;
        let namespace = consumer.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<PulsarConsumer> = Api::namespaced(self.client.clone(), &namespace);

        debug!(name = %name, replicas = status.replicas, "Updating consumer status");

        let patch = status_patch(consumer, status);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(OperatorError::from)?;

        Ok(())
    }
}

/// Merge patch for the status subresource
///
/// Carries the resourceVersion the status was derived from, so the API
/// server rejects the write with a conflict if the consumer changed since.
fn status_patch(consumer: &PulsarConsumer, status: &PulsarConsumerStatus) -> serde_json::Value {
    match consumer.metadata.resource_version.as_deref() {
        Some(rv) => serde_json::json!({
            "metadata": { "resourceVersion": rv },
            "status": status
        }),
        None => serde_json::json!({ "status": status }),
    }
}
