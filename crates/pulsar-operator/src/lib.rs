//! # Pulsar Consumer Kubernetes Operator
//!
//! Kubernetes operator that runs Apache Pulsar consumers declared through a
//! `PulsarConsumer` custom resource.
//!
//! Each `PulsarConsumer` is materialized as a Deployment named
//! `<name>-deployment` whose single container receives the server address,
//! topic and subscription through the `PULSAR_SERVER`, `PULSAR_TOPIC` and
//! `PULSAR_SUBSCRIPTION_NAME` environment variables. The Deployment is owned
//! by the custom resource, so deleting the resource garbage-collects it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pulsar_operator::prelude::*;
//! use kube::Client;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!
//!     run_controller(client, None, BuilderConfig::default(), CancellationToken::new()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Watch**: Monitor PulsarConsumer resources, admitting only events that
//!    change `metadata.generation`
//! 2. **Build**: Derive the desired Deployment from the spec
//! 3. **Compare**: Check the live Deployment against every field the operator sets
//! 4. **Act**: Create the Deployment, overwrite its spec, or do nothing
//! 5. **Status**: After a confirmed write, mirror the applied spec into the status
//!
//! An already-converged resource costs two reads and no writes.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types with validation
//! - [`resources`] - Deployment builder
//! - [`compare`] - Desired vs observed comparison
//! - [`kube_client`] - Cluster access used by the reconciler
//! - [`controller`] - Reconciliation logic and controller setup
//! - [`error`] - Error types for operator operations
//!
//! ## Custom Resource Definition
//!
//! ```yaml
//! apiVersion: pulsar.pulsarconsumer.krvarma.com/v1
//! kind: PulsarConsumer
//! metadata:
//!   name: orders
//! spec:
//!   serverAddress: pulsar://pulsar-broker:6650
//!   topic: orders
//!   subscriptionName: orders-audit
//!   replicas: 3
//! ```
//!
//! ## Metrics
//!
//! - `pulsar_operator_reconciliations_total` - Total reconciliation attempts
//! - `pulsar_operator_reconciliation_errors_total` - Reconciliation errors
//! - `pulsar_operator_reconciliation_duration_seconds` - Reconciliation latency
//! - `pulsar_operator_reconcile_outcomes_total{state}` - Outcomes by state

pub mod compare;
pub mod controller;
pub mod crd;
pub mod error;
pub mod kube_client;
pub mod resources;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::compare::{needs_update, needs_update_with, ComparisonMode};
    pub use crate::controller::{
        reconcile_consumer, run_controller, ControllerContext, ControllerMetrics, ReconcileState,
    };
    pub use crate::crd::{crd_yaml, PulsarConsumer, PulsarConsumerSpec, PulsarConsumerStatus};
    pub use crate::error::{OperatorError, Result};
    pub use crate::kube_client::{ConsumerKubeClient, KubeConsumerClient};
    pub use crate::resources::{deployment_name, BuilderConfig, ResourceBuilder};
}
