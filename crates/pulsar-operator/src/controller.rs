//! PulsarConsumer Controller
//!
//! This module implements the Kubernetes controller pattern for managing
//! PulsarConsumer custom resources. Each invocation re-reads the consumer,
//! builds the desired Deployment, compares it with the live one and applies
//! at most one workload write, followed by one status write.

use crate::compare::needs_update;
use crate::crd::{PulsarConsumer, PulsarConsumerStatus};
use crate::error::{OperatorError, Result};
use crate::kube_client::{ConsumerKubeClient, KubeConsumerClient};
use crate::resources::{BuilderConfig, ResourceBuilder};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a single reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// The PulsarConsumer no longer exists; nothing to do
    Absent,
    /// The Deployment did not exist and was created
    Creating,
    /// The Deployment already matches; nothing was written
    InSync,
    /// The Deployment had drifted and was overwritten
    Updating,
}

impl ReconcileState {
    /// Label value used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Absent => "absent",
            ReconcileState::Creating => "creating",
            ReconcileState::InSync => "in_sync",
            ReconcileState::Updating => "updating",
        }
    }

    /// Whether this outcome wrote to the cluster
    pub fn mutated(&self) -> bool {
        matches!(self, ReconcileState::Creating | ReconcileState::Updating)
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context passed to the controller
pub struct ControllerContext {
    /// Cluster access
    pub client: Arc<dyn ConsumerKubeClient>,
    /// Settings for building Deployments
    pub builder: BuilderConfig,
    /// Metrics recorder (optional)
    pub metrics: Option<ControllerMetrics>,
    /// Cancelled when the operator shuts down
    pub shutdown: CancellationToken,
}

impl ControllerContext {
    /// Create a context without metrics
    pub fn new(
        client: Arc<dyn ConsumerKubeClient>,
        builder: BuilderConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            builder,
            metrics: None,
            shutdown,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("pulsar_operator_reconciliations_total"),
            errors: metrics::counter!("pulsar_operator_reconciliation_errors_total"),
            duration: metrics::histogram!("pulsar_operator_reconciliation_duration_seconds"),
        }
    }

    /// Count a completed reconciliation by outcome
    pub fn record_outcome(&self, state: ReconcileState) {
        metrics::counter!("pulsar_operator_reconcile_outcomes_total", "state" => state.as_str())
            .increment(1);
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch predicate admitting a consumer when its generation changes
///
/// The uid is part of the key: the filter caches by name, and a consumer
/// deleted and recreated under the same name starts again at generation 1.
fn generation_changed(consumer: &PulsarConsumer) -> Option<u64> {
    let meta = consumer.meta();
    let generation = meta.generation?;

    let mut hasher = DefaultHasher::new();
    meta.uid.hash(&mut hasher);
    generation.hash(&mut hasher);
    Some(hasher.finish())
}

/// Start the PulsarConsumer controller
///
/// Only events that change `metadata.generation` (or recreate the object)
/// reach the reconciler, so the operator's own status writes never trigger
/// another reconciliation.
pub async fn run_controller(
    client: Client,
    namespace: Option<String>,
    builder: BuilderConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let consumers: Api<PulsarConsumer> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let ctx = Arc::new(
        ControllerContext::new(
            Arc::new(KubeConsumerClient::new(client)),
            builder,
            shutdown,
        )
        .with_metrics(ControllerMetrics::new()),
    );

    info!(
        namespace = namespace.as_deref().unwrap_or("all"),
        image = %ctx.builder.image,
        "Starting PulsarConsumer controller"
    );

    let (reader, writer) = reflector::store();
    let events = watcher(consumers, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(generation_changed);

    Controller::for_stream(events, reader)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    info!("PulsarConsumer controller stopped");

    Ok(())
}

/// Main reconciliation function
///
/// Races the reconciliation against shutdown. A cancelled invocation drops
/// its in-flight API call and never reaches the status write.
#[instrument(skip(consumer, ctx), fields(name = %consumer.name_any(), namespace = consumer.namespace()))]
pub async fn reconcile(consumer: Arc<PulsarConsumer>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = Instant::now();

    if let Some(ref metrics) = ctx.metrics {
        metrics.reconciliations.increment(1);
    }

    let name = consumer.name_any();
    let namespace = consumer.namespace().unwrap_or_else(|| "default".to_string());

    let result = tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => Err(OperatorError::Cancelled),
        result = reconcile_consumer(ctx.client.as_ref(), &ctx.builder, &name, &namespace) => result,
    };

    if let Some(ref metrics) = ctx.metrics {
        metrics.duration.record(start.elapsed().as_secs_f64());
    }

    match result {
        Ok(state) => {
            if state.mutated() {
                info!(state = %state, "Reconciliation complete");
            } else {
                debug!(state = %state, "Reconciliation complete, nothing written");
            }
            if let Some(ref metrics) = ctx.metrics {
                metrics.record_outcome(state);
            }
            Ok(Action::await_change())
        }
        Err(e) => {
            if let Some(ref metrics) = ctx.metrics {
                metrics.errors.increment(1);
            }
            Err(e)
        }
    }
}

/// Drive one PulsarConsumer toward its declared state
pub async fn reconcile_consumer(
    client: &dyn ConsumerKubeClient,
    builder: &BuilderConfig,
    name: &str,
    namespace: &str,
) -> Result<ReconcileState> {
    let Some(consumer) = client.get_consumer(name, namespace).await? else {
        info!(name = %name, namespace = %namespace, "PulsarConsumer not found");
        return Ok(ReconcileState::Absent);
    };

    if let Some(errors) = consumer.spec.validation_errors() {
        warn!(name = %name, errors = %errors, "PulsarConsumer spec validation failed");
        return Err(OperatorError::ValidationError(errors));
    }

    let resources = ResourceBuilder::new(&consumer, builder)?;
    let desired = resources.build_deployment()?;
    let deployment_name = resources.deployment_name();

    let state = match client.get_deployment(&deployment_name, namespace).await? {
        None => {
            info!(name = %name, deployment = %deployment_name, "Creating Deployment");
            client.create_deployment(namespace, &desired).await?;
            ReconcileState::Creating
        }
        Some(mut observed) => {
            let desired_spec = desired.spec.unwrap_or_default();
            let observed_spec = observed.spec.clone().unwrap_or_default();

            if !needs_update(&desired_spec, &observed_spec)? {
                debug!(name = %name, deployment = %deployment_name, "Deployment in sync");
                return Ok(ReconcileState::InSync);
            }

            info!(name = %name, deployment = %deployment_name, "Updating Deployment");
            observed.spec = Some(desired_spec);
            client.replace_deployment(namespace, &observed).await?;
            ReconcileState::Updating
        }
    };

    let status = PulsarConsumerStatus::from_spec(&consumer.spec);
    client.update_consumer_status(&consumer, &status).await?;

    Ok(state)
}

/// Error policy for the controller
///
/// Retryable errors come back after the error's suggested delay; the rest
/// wait for the next spec change.
fn error_policy(
    consumer: Arc<PulsarConsumer>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> Action {
    match error.requeue_delay() {
        Some(delay) => {
            warn!(
                error = %error,
                conflict = error.is_conflict(),
                delay_secs = delay.as_secs(),
                "Reconciliation error for '{}', will retry",
                consumer.name_any()
            );
            Action::requeue(delay)
        }
        None => {
            warn!(
                error = %error,
                "Reconciliation error for '{}', waiting for a spec change",
                consumer.name_any()
            );
            Action::await_change()
        }
    }
}
