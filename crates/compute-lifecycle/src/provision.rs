//! Provisioning orchestrator
//!
//! Turns a pending container record into its six cluster resources, strictly in
//! order, under one shared deadline:
//!
//! 1. namespace (labelled with owner and container ID)
//! 2. SSH secret with the selected keys
//! 3. volume claim
//! 4. network policy
//! 5. workload
//! 6. load balancer service
//!
//! The first failing step marks the record `failed` and ends the sequence.
//! Resources created before the failure are left in place; deleting the
//! container's namespace removes them. On success the record becomes `running`
//! and an endpoint poller is submitted.

use compute_core::{Container, ContainerStatus, Timeouts};
use compute_kube::{NamespaceOwner, ResourceGateway};
use compute_store::ContainerStore;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::poller::EndpointPoller;
use crate::supervisor::TaskSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Namespace,
    SshSecret,
    VolumeClaim,
    NetworkPolicy,
    Workload,
    Service,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 6] = [
        ProvisionStep::Namespace,
        ProvisionStep::SshSecret,
        ProvisionStep::VolumeClaim,
        ProvisionStep::NetworkPolicy,
        ProvisionStep::Workload,
        ProvisionStep::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::Namespace => "namespace",
            ProvisionStep::SshSecret => "ssh secret",
            ProvisionStep::VolumeClaim => "volume claim",
            ProvisionStep::NetworkPolicy => "network policy",
            ProvisionStep::Workload => "pod",
            ProvisionStep::Service => "load balancer",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provisioning attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Provisioned,
    Failed { step: ProvisionStep, reason: String },
}

impl ProvisionOutcome {
    pub fn is_provisioned(&self) -> bool {
        matches!(self, ProvisionOutcome::Provisioned)
    }
}

/// Runs the provisioning sequence for one container at a time
pub struct Provisioner<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    supervisor: TaskSupervisor,
    timeouts: Timeouts,
}

impl<G, S> Clone for Provisioner<G, S> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            supervisor: self.supervisor.clone(),
            timeouts: self.timeouts.clone(),
        }
    }
}

impl<G, S> Provisioner<G, S>
where
    G: ResourceGateway + 'static,
    S: ContainerStore + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        store: Arc<S>,
        supervisor: TaskSupervisor,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            gateway,
            store,
            supervisor,
            timeouts,
        }
    }

    /// Submit provisioning as a background task with its own deadline
    pub fn submit(&self, container: Container, authorized_keys: String) {
        let provisioner = self.clone();
        let span = tracing::info_span!(
            "provision",
            container = %container.id,
            namespace = %container.namespace
        );
        self.supervisor
            .spawn(span, self.timeouts.provision, move |deadline| async move {
                provisioner.run(&container, &authorized_keys, deadline).await;
            });
    }

    /// Run the whole sequence and record the result on the container row
    pub async fn run(
        &self,
        container: &Container,
        authorized_keys: &str,
        deadline: Instant,
    ) -> ProvisionOutcome {
        let outcome = match self.create_resources(container, authorized_keys, deadline).await {
            Ok(()) => ProvisionOutcome::Provisioned,
            Err((step, reason)) => ProvisionOutcome::Failed { step, reason },
        };

        match &outcome {
            ProvisionOutcome::Provisioned => {
                self.record(&container.id, ContainerStatus::Running).await;
                tracing::info!(
                    container = %container.id,
                    namespace = %container.namespace,
                    "container provisioned"
                );
                self.submit_poller(container);
            }
            ProvisionOutcome::Failed { step, reason } => {
                tracing::error!(
                    container = %container.id,
                    step = %step,
                    error = %reason,
                    "provisioning failed"
                );
                self.record(&container.id, ContainerStatus::Failed).await;
            }
        }

        outcome
    }

    async fn create_resources(
        &self,
        container: &Container,
        authorized_keys: &str,
        deadline: Instant,
    ) -> Result<(), (ProvisionStep, String)> {
        let ns = container.namespace.as_str();
        let gateway = &self.gateway;
        let owner = NamespaceOwner::new(container.user_id, container.id.clone());

        step(ProvisionStep::Namespace, deadline, gateway.create_namespace(ns, &owner)).await?;
        step(
            ProvisionStep::SshSecret,
            deadline,
            gateway.create_ssh_secret(ns, authorized_keys),
        )
        .await?;
        step(
            ProvisionStep::VolumeClaim,
            deadline,
            gateway.create_volume_claim(ns, container.storage_gb),
        )
        .await?;
        step(
            ProvisionStep::NetworkPolicy,
            deadline,
            gateway.create_network_policy(ns),
        )
        .await?;
        step(
            ProvisionStep::Workload,
            deadline,
            gateway.create_workload(ns, &container.image, container.memory_mb),
        )
        .await?;
        step(ProvisionStep::Service, deadline, gateway.create_service(ns)).await?;

        Ok(())
    }

    async fn record(&self, id: &str, status: ContainerStatus) {
        if let Err(e) = self.store.update_status(id, status).await {
            tracing::error!(container = %id, status = %status, error = %e, "failed to record status");
        }
    }

    fn submit_poller(&self, container: &Container) {
        let poller = EndpointPoller::new(
            self.gateway.clone(),
            self.store.clone(),
            self.timeouts.poll_interval,
        );
        let id = container.id.clone();
        let namespace = container.namespace.clone();
        let span = tracing::info_span!("poll_address", container = %id);

        self.supervisor
            .spawn(span, self.timeouts.poll_deadline, move |deadline| async move {
                poller.run(&id, &namespace, deadline).await;
            });
    }
}

/// Run one step against the shared deadline
async fn step<F, E>(
    step: ProvisionStep,
    deadline: Instant,
    operation: F,
) -> Result<(), (ProvisionStep, String)>
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    tracing::debug!(step = %step, "creating");
    match tokio::time::timeout_at(deadline, operation).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err((step, e.to_string())),
        Err(_) => Err((step, "deadline exceeded".to_string())),
    }
}
