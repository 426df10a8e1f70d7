//! Operations exposed to a request layer
//!
//! Every call takes the caller's `Principal` explicitly. A container that belongs
//! to someone else is reported as not found, exactly like one that does not exist.

use chrono::Utc;
use compute_core::{
    ComputeConfig, Container, ContainerStatus, Defaults, Limits, NewContainer, Principal, SshKey,
    Timeouts, authorized_keys,
};
use compute_kube::ResourceGateway;
use compute_store::{ContainerStore, CredentialStore};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::credentials::CredentialService;
use crate::error::{ComputeError, Result, UpstreamError};
use crate::provision::Provisioner;
use crate::reconcile::Reconciler;
use crate::supervisor::TaskSupervisor;

/// The container lifecycle service
pub struct ComputeService<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    supervisor: TaskSupervisor,
    provisioner: Provisioner<G, S>,
    reconciler: Reconciler<G, S>,
    credentials: CredentialService<S>,
    defaults: Defaults,
    limits: Limits,
    timeouts: Timeouts,
}

impl<G, S> ComputeService<G, S>
where
    G: ResourceGateway + 'static,
    S: ContainerStore + CredentialStore + 'static,
{
    pub fn new(gateway: Arc<G>, store: Arc<S>, config: &ComputeConfig) -> Self {
        let supervisor = TaskSupervisor::new();
        let provisioner = Provisioner::new(
            gateway.clone(),
            store.clone(),
            supervisor.clone(),
            config.timeouts.clone(),
        );
        let reconciler = Reconciler::new(gateway.clone(), store.clone(), config.timeouts.reconcile);
        let credentials = CredentialService::new(store.clone(), config.limits.clone());

        Self {
            gateway,
            store,
            supervisor,
            provisioner,
            reconciler,
            credentials,
            defaults: config.defaults.clone(),
            limits: config.limits.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// SSH and API key operations
    pub fn credentials(&self) -> &CredentialService<S> {
        &self.credentials
    }

    /// Background provisioning and polling tasks
    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    // ========== Containers ==========

    /// Validate the request, record a pending container and start provisioning.
    ///
    /// Returns as soon as the record exists; provisioning continues in the
    /// background and its result is only visible as the container's status.
    pub async fn create_container(
        &self,
        principal: &Principal,
        request: NewContainer,
    ) -> Result<Container> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ComputeError::validation("name is required"));
        }
        let count = self
            .store
            .count_by_user(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("count containers", e))?;
        if count >= self.limits.containers_per_user {
            return Err(ComputeError::LimitExceeded {
                resource: "container",
                limit: self.limits.containers_per_user,
            });
        }

        if request.ssh_key_ids.is_empty() {
            return Err(ComputeError::validation("at least one SSH key is required"));
        }
        let mut seen = HashSet::new();
        if !request.ssh_key_ids.iter().all(|id| seen.insert(*id)) {
            return Err(ComputeError::validation("duplicate SSH key IDs"));
        }

        let keys = self.selected_keys(principal, &request.ssh_key_ids).await?;
        let content = authorized_keys(keys.iter());

        let container = Container::pending(
            principal.user_id,
            name,
            request.memory_or(self.defaults.memory_mb),
            request.storage_or(self.defaults.storage_gb),
            self.defaults.image.clone(),
        );
        self.store
            .create(&container)
            .await
            .map_err(|e| ComputeError::upstream("create container record", e))?;

        tracing::info!(
            container = %container.id,
            user = principal.user_id,
            namespace = %container.namespace,
            "container created"
        );
        self.provisioner.submit(container.clone(), content);
        Ok(container)
    }

    /// The caller's keys for `ids`, in the order the IDs were given
    async fn selected_keys(&self, principal: &Principal, ids: &[i64]) -> Result<Vec<SshKey>> {
        let found = self
            .store
            .ssh_keys_by_ids(principal.user_id, ids)
            .await
            .map_err(|e| ComputeError::upstream("load ssh keys", e))?;

        ids.iter()
            .map(|id| found.iter().find(|k| k.id == *id).cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or(ComputeError::NotFound { resource: "ssh key" })
    }

    /// Fetch one container, reconciled against the cluster
    pub async fn get_container(&self, principal: &Principal, id: &str) -> Result<Container> {
        let container = self.owned_container(principal, id).await?;
        Ok(self.reconciler.reconcile(container).await)
    }

    /// The caller's containers, newest first, as stored
    pub async fn list_containers(&self, principal: &Principal) -> Result<Vec<Container>> {
        self.store
            .list_by_user(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("list containers", e))
    }

    /// Delete the workload only; everything else in the namespace stays
    pub async fn stop_container(&self, principal: &Principal, id: &str) -> Result<Container> {
        let mut container = self.owned_container(principal, id).await?;
        self.bounded("delete pod", self.gateway.delete_workload(&container.namespace))
            .await?;

        let now = Utc::now();
        self.store
            .mark_stopped(&container.id, now)
            .await
            .map_err(|e| ComputeError::upstream("record stopped container", e))?;

        tracing::info!(container = %container.id, "container stopped");
        container.mark_stopped(now);
        Ok(container)
    }

    /// Re-create the workload from the stored image and memory
    pub async fn start_container(&self, principal: &Principal, id: &str) -> Result<Container> {
        let mut container = self.owned_container(principal, id).await?;
        self.bounded(
            "create pod",
            self.gateway
                .create_workload(&container.namespace, &container.image, container.memory_mb),
        )
        .await?;

        let status = ContainerStatus::Pending;
        self.store
            .update_status(&container.id, status)
            .await
            .map_err(|e| ComputeError::upstream("record started container", e))?;

        tracing::info!(container = %container.id, "container started");
        container.set_status(status);
        Ok(container)
    }

    /// Delete the namespace (and with it every resource), then the record
    pub async fn delete_container(&self, principal: &Principal, id: &str) -> Result<()> {
        let container = self.owned_container(principal, id).await?;
        self.bounded(
            "delete namespace",
            self.gateway.delete_namespace(&container.namespace),
        )
        .await?;

        self.store
            .delete(&container.id)
            .await
            .map_err(|e| ComputeError::upstream("delete container record", e))?;

        tracing::info!(container = %container.id, namespace = %container.namespace, "container deleted");
        Ok(())
    }

    async fn owned_container(&self, principal: &Principal, id: &str) -> Result<Container> {
        let container = self
            .store
            .get(id)
            .await
            .map_err(|e| ComputeError::upstream("load container", e))?;

        match container {
            Some(c) if principal.owns(c.user_id) => Ok(c),
            _ => Err(ComputeError::NotFound {
                resource: "container",
            }),
        }
    }

    /// Run a gateway call under the operation deadline
    async fn bounded<T, E, F>(&self, context: &str, operation: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<UpstreamError>,
    {
        let deadline = Instant::now() + self.timeouts.operation;
        match tokio::time::timeout_at(deadline, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ComputeError::upstream(context, e)),
            Err(_) => Err(ComputeError::upstream(
                context,
                UpstreamError::Timeout(self.timeouts.operation),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute_core::WorkloadPhase;
    use compute_kube::{AddressResponse, GatewayOp, MockGateway};
    use compute_store::MockStore;
    use std::time::Duration;

    const ED25519: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl alice@laptop";
    const RSA: &str = "ssh-rsa AAAAB3NzaC1yc2E= alice@desktop";

    struct Fixture {
        gateway: Arc<MockGateway>,
        store: Arc<MockStore>,
        service: ComputeService<MockGateway, MockStore>,
        alice: Principal,
        key: SshKey,
    }

    async fn fixture() -> Fixture {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::new());
        let service = ComputeService::new(gateway.clone(), store.clone(), &ComputeConfig::default());
        let alice = Principal::new(1);
        let key = service
            .credentials()
            .add_ssh_key(&alice, "laptop", ED25519)
            .await
            .unwrap();

        Fixture {
            gateway,
            store,
            service,
            alice,
            key,
        }
    }

    fn request(name: &str, keys: Vec<i64>) -> NewContainer {
        NewContainer::new(name, keys)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_defaults() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("  dev1 ", vec![f.key.id]))
            .await
            .unwrap();

        assert_eq!(container.name, "dev1");
        assert_eq!(container.status, ContainerStatus::Pending);
        assert_eq!(container.memory_mb, 512);
        assert_eq!(container.storage_gb, 5);
        assert_eq!(container.image, "eddisonso/edd-compute-base:latest");
        assert_eq!(container.namespace, format!("compute-1-{}", container.id));
        assert!(container.external_ip.is_none());

        f.service.supervisor().wait_idle().await;
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Running);
        for op in [
            GatewayOp::CreateNamespace,
            GatewayOp::CreateSshSecret,
            GatewayOp::CreateVolumeClaim,
            GatewayOp::CreateNetworkPolicy,
            GatewayOp::CreateWorkload,
            GatewayOp::CreateService,
        ] {
            assert_eq!(f.gateway.operation_counts().get(op), 1);
        }

        f.gateway.set_phase(&container.namespace, WorkloadPhase::Running);
        let view = f.service.get_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(view.status, ContainerStatus::Running);
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_while_pod_is_pending() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Running);

        // The pod was just created and has not been scheduled yet
        let view = f.service.get_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(view.status, ContainerStatus::Pending);
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_found_by_poller() {
        let f = fixture().await;
        f.gateway.script_addresses([
            AddressResponse::Pending,
            AddressResponse::Assigned("203.0.113.30".to_string()),
        ]);
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();

        f.service.supervisor().wait_idle().await;
        let stored = f.store.peek(&container.id).unwrap();
        assert_eq!(stored.external_ip.as_deref(), Some("203.0.113.30"));
        assert_eq!(stored.ssh_command().as_deref(), Some("ssh root@203.0.113.30"));
        assert_eq!(f.gateway.operation_counts().get(GatewayOp::GetServiceAddress), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secret_keeps_requested_key_order() {
        let f = fixture().await;
        let second = f
            .service
            .credentials()
            .add_ssh_key(&f.alice, "desktop", RSA)
            .await
            .unwrap();

        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![second.id, f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        let ns = f.gateway.namespace(&container.namespace).unwrap();
        assert_eq!(
            ns.authorized_keys.unwrap(),
            format!("{}\n{}\n", RSA, ED25519)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_validation() {
        let f = fixture().await;

        let err = f
            .service
            .create_container(&f.alice, request("   ", vec![f.key.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::Validation(_)));

        let err = f
            .service
            .create_container(&f.alice, request("dev1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::Validation(_)));

        let err = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id, f.key.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::Validation(_)));

        assert_eq!(f.store.container_count(), 0);
        assert_eq!(f.gateway.operation_counts().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_ssh_key_is_not_found() {
        let f = fixture().await;
        let bob = Principal::new(2);
        let bobs_key = f
            .service
            .credentials()
            .add_ssh_key(&bob, "bob", RSA)
            .await
            .unwrap();

        let err = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id, bobs_key.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::NotFound { resource: "ssh key" }));
        assert_eq!(f.store.container_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_cap() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            let c = f
                .service
                .create_container(&f.alice, request(&format!("dev{}", i), vec![f.key.id]))
                .await
                .unwrap();
            ids.push(c.id);
        }

        let err = f
            .service
            .create_container(&f.alice, request("dev4", vec![f.key.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::LimitExceeded { limit: 3, .. }));
        assert_eq!(err.status_code(), 400);
        assert_eq!(f.store.container_count(), 3);

        // The cap is checked before the key list
        let err = f
            .service
            .create_container(&f.alice, request("dev4", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::LimitExceeded { limit: 3, .. }));

        f.service.supervisor().wait_idle().await;
        f.service.delete_container(&f.alice, &ids[0]).await.unwrap();
        f.service
            .create_container(&f.alice, request("dev4", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_users_container_is_not_found() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;
        f.gateway.reset_counts();

        let bob = Principal::new(2);
        let not_found = |r: Result<Container>| {
            matches!(r, Err(ComputeError::NotFound { resource: "container" }))
        };
        assert!(not_found(f.service.get_container(&bob, &container.id).await));
        assert!(not_found(f.service.stop_container(&bob, &container.id).await));
        assert!(not_found(f.service.start_container(&bob, &container.id).await));
        assert!(matches!(
            f.service.delete_container(&bob, &container.id).await,
            Err(ComputeError::NotFound { .. })
        ));
        assert!(not_found(f.service.get_container(&f.alice, "ffffffff").await));
        assert!(f.service.list_containers(&bob).await.unwrap().is_empty());

        assert_eq!(f.gateway.operation_counts().total(), 0);
        assert!(f.store.peek(&container.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_touches_only_the_pod() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;
        f.gateway.reset_counts();

        let stopped = f.service.stop_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(stopped.status, ContainerStatus::Stopped);
        assert!(stopped.stopped_at.is_some());
        assert!(f.store.peek(&container.id).unwrap().stopped_at.is_some());

        let started = f.service.start_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(started.status, ContainerStatus::Pending);
        assert!(started.stopped_at.is_none());
        assert!(f.store.peek(&container.id).unwrap().stopped_at.is_none());

        let counts = f.gateway.operation_counts();
        assert_eq!(counts.get(GatewayOp::DeleteWorkload), 1);
        assert_eq!(counts.get(GatewayOp::CreateWorkload), 1);
        assert_eq!(
            counts.others(&[GatewayOp::DeleteWorkload, GatewayOp::CreateWorkload]),
            0
        );

        let ns = f.gateway.namespace(&container.namespace).unwrap();
        let workload = ns.workload.unwrap();
        assert_eq!(workload.image, container.image);
        assert_eq!(workload.memory_mb, 512);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_against_missing_pod() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        f.service.stop_container(&f.alice, &container.id).await.unwrap();
        f.service.stop_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_failure_leaves_record_unchanged() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        f.gateway.fail_on(GatewayOp::DeleteWorkload, "forbidden");
        let err = f.service.stop_container(&f.alice, &container.id).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Running);

        f.gateway.fail_on(GatewayOp::DeleteNamespace, "forbidden");
        assert!(f.service.delete_container(&f.alice, &container.id).await.is_err());
        assert!(f.store.peek(&container.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_deadline() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        f.gateway.hang_on(GatewayOp::CreateWorkload);
        let start = Instant::now();
        let err = f.service.start_container(&f.alice, &container.id).await.unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert!(matches!(
            err,
            ComputeError::Upstream {
                source: UpstreamError::Timeout(_),
                ..
            }
        ));
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_after_gateway_success() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        f.store.fail_on("mark_stopped");
        let err = f.service.stop_container(&f.alice, &container.id).await.unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Upstream {
                source: UpstreamError::Store(_),
                ..
            }
        ));
        // The pod is gone even though the record still says running
        assert!(f.gateway.namespace(&container.namespace).unwrap().workload.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_with_missing_namespace() {
        let f = fixture().await;
        let container = Container::with_id("0badf00d", 1, "orphan", 512, 5, "img");
        f.store.create(&container).await.unwrap();

        f.service.delete_container(&f.alice, "0badf00d").await.unwrap();
        assert!(f.store.peek("0badf00d").is_none());
        assert_eq!(f.gateway.operation_counts().get(GatewayOp::DeleteNamespace), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_provisioning_is_visible_as_status() {
        let f = fixture().await;
        f.gateway.fail_on(GatewayOp::CreateNetworkPolicy, "admission webhook denied");

        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        assert_eq!(container.status, ContainerStatus::Pending);

        f.service.supervisor().wait_idle().await;
        let view = f.service.get_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(view.status, ContainerStatus::Failed);
        assert_eq!(f.gateway.operation_counts().get(GatewayOp::CreateWorkload), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_reconciles_status() {
        let f = fixture().await;
        let container = f
            .service
            .create_container(&f.alice, request("dev1", vec![f.key.id]))
            .await
            .unwrap();
        f.service.supervisor().wait_idle().await;

        f.gateway.set_phase(&container.namespace, WorkloadPhase::Failed);
        let view = f.service.get_container(&f.alice, &container.id).await.unwrap();
        assert_eq!(view.status, ContainerStatus::Failed);
        assert_eq!(f.store.peek(&container.id).unwrap().status, ContainerStatus::Failed);
    }
}
