//! Read-time status reconciliation
//!
//! Stored status drifts from reality (a pod crashes, completes, or is evicted). On
//! every single-container read the live workload phase is fetched and, when it
//! maps to a different stored status, written back before the record is returned.
//! A missing external address is looked up the same way. Failures only cost
//! freshness: they are logged and the stored values are returned.

use chrono::Utc;
use compute_core::{Container, ContainerStatus, WorkloadPhase};
use compute_kube::ResourceGateway;
use compute_store::ContainerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct Reconciler<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    timeout: Duration,
}

impl<G, S> Reconciler<G, S>
where
    G: ResourceGateway,
    S: ContainerStore,
{
    pub fn new(gateway: Arc<G>, store: Arc<S>, timeout: Duration) -> Self {
        Self {
            gateway,
            store,
            timeout,
        }
    }

    /// Bring `container` in line with the cluster, persisting any correction.
    ///
    /// The returned record only reflects corrections that were written.
    pub async fn reconcile(&self, mut container: Container) -> Container {
        let deadline = Instant::now() + self.timeout;
        let namespace = container.namespace.clone();

        match tokio::time::timeout_at(deadline, self.gateway.workload_phase(&namespace)).await {
            Ok(Ok(phase)) => self.apply_phase(&mut container, phase).await,
            Ok(Err(e)) => {
                tracing::warn!(container = %container.id, error = %e, "failed to read pod phase");
            }
            Err(_) => {
                tracing::warn!(container = %container.id, "timed out reading pod phase");
            }
        }

        if container.external_ip.is_none() {
            let query = self.gateway.service_external_address(&namespace);
            match tokio::time::timeout_at(deadline, query).await {
                Ok(Ok(Some(address))) => self.apply_address(&mut container, address).await,
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::debug!(container = %container.id, error = %e, "failed to read external address");
                }
                Err(_) => {
                    tracing::debug!(container = %container.id, "timed out reading external address");
                }
            }
        }

        container
    }

    async fn apply_phase(&self, container: &mut Container, phase: WorkloadPhase) {
        let Some(observed) = phase.observed_status() else {
            tracing::debug!(container = %container.id, phase = %phase, "keeping stored status");
            return;
        };
        if observed == container.status {
            return;
        }

        // A pod that ran to completion is a stop, so it carries a stop time
        let stopped_at = (observed == ContainerStatus::Stopped).then(Utc::now);
        let persisted = match stopped_at {
            Some(at) => self.store.mark_stopped(&container.id, at).await,
            None => self.store.update_status(&container.id, observed).await,
        };

        match persisted {
            Ok(()) => {
                tracing::info!(
                    container = %container.id,
                    from = %container.status,
                    to = %observed,
                    "status corrected from cluster"
                );
                match stopped_at {
                    Some(at) => container.mark_stopped(at),
                    None => container.set_status(observed),
                }
            }
            Err(e) => {
                tracing::warn!(container = %container.id, error = %e, "failed to persist observed status");
            }
        }
    }

    async fn apply_address(&self, container: &mut Container, address: String) {
        match self.store.set_external_address(&container.id, &address).await {
            Ok(true) => container.external_ip = Some(address),
            // Someone else (usually the poller) got there first
            Ok(false) => match self.store.get(&container.id).await {
                Ok(Some(stored)) => container.external_ip = stored.external_ip,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(container = %container.id, error = %e, "failed to re-read container");
                }
            },
            Err(e) => {
                tracing::warn!(container = %container.id, error = %e, "failed to persist external address");
            }
        }
    }
}
