//! Kubernetes-backed resource gateway

use async_trait::async_trait;
use compute_core::{ClusterConfig, WorkloadPhase};
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{
    Client,
    api::{Api, DeleteParams, PostParams},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::error::{self, KubeError, Result};
use crate::gateway::{GatewayOp, NamespaceOwner, ResourceGateway};
use crate::resources;

/// Resource gateway talking to a live API server
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    cluster: ClusterConfig,
}

impl KubeGateway {
    /// Connect using the in-cluster config or the local kubeconfig
    pub async fn new(cluster: ClusterConfig) -> Result<Self> {
        let client = Client::try_default().await.map_err(KubeError::Client)?;
        Ok(Self { client, cluster })
    }

    /// Create with an existing Kubernetes client
    pub fn with_client(client: Client, cluster: ClusterConfig) -> Self {
        Self { client, cluster }
    }

    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Create a resource, treating "already exists" as success
async fn create_or_ignore<K>(api: &Api<K>, op: GatewayOp, resource: &K) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), resource).await {
        Ok(_) => Ok(()),
        Err(e) if error::is_already_exists(&e) => {
            tracing::debug!("{}: already exists, continuing", op);
            Ok(())
        }
        Err(e) => Err(KubeError::api(op, e)),
    }
}

/// Delete a resource, treating "not found" as success
async fn delete_or_ignore<K>(api: &Api<K>, op: GatewayOp, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if error::is_not_found(&e) => {
            tracing::debug!("{} {}: already absent", op, name);
            Ok(())
        }
        Err(e) => Err(KubeError::api(op, e)),
    }
}

#[async_trait]
impl ResourceGateway for KubeGateway {
    async fn create_namespace(&self, name: &str, owner: &NamespaceOwner) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        create_or_ignore(&api, GatewayOp::CreateNamespace, &resources::namespace(name, owner)).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        delete_or_ignore(&api, GatewayOp::DeleteNamespace, name).await
    }

    async fn create_ssh_secret(&self, namespace: &str, authorized_keys: &str) -> Result<()> {
        let api: Api<Secret> = self.namespaced(namespace);
        let secret = resources::ssh_secret(namespace, authorized_keys);
        create_or_ignore(&api, GatewayOp::CreateSshSecret, &secret).await
    }

    async fn create_volume_claim(&self, namespace: &str, storage_gb: u32) -> Result<()> {
        let api: Api<PersistentVolumeClaim> = self.namespaced(namespace);
        let claim = resources::volume_claim(namespace, storage_gb, &self.cluster);
        create_or_ignore(&api, GatewayOp::CreateVolumeClaim, &claim).await
    }

    async fn create_network_policy(&self, namespace: &str) -> Result<()> {
        let api: Api<NetworkPolicy> = self.namespaced(namespace);
        let policy = resources::network_policy(namespace, &self.cluster);
        create_or_ignore(&api, GatewayOp::CreateNetworkPolicy, &policy).await
    }

    async fn create_workload(&self, namespace: &str, image: &str, memory_mb: u32) -> Result<()> {
        let api: Api<Pod> = self.namespaced(namespace);
        let pod = resources::workload(namespace, image, memory_mb, &self.cluster);
        create_or_ignore(&api, GatewayOp::CreateWorkload, &pod).await
    }

    async fn delete_workload(&self, namespace: &str) -> Result<()> {
        let api: Api<Pod> = self.namespaced(namespace);
        delete_or_ignore(&api, GatewayOp::DeleteWorkload, resources::WORKLOAD_NAME).await
    }

    async fn create_service(&self, namespace: &str) -> Result<()> {
        let api: Api<Service> = self.namespaced(namespace);
        create_or_ignore(&api, GatewayOp::CreateService, &resources::service(namespace)).await
    }

    async fn service_external_address(&self, namespace: &str) -> Result<Option<String>> {
        let api: Api<Service> = self.namespaced(namespace);
        let service = api
            .get(resources::SERVICE_NAME)
            .await
            .map_err(|e| KubeError::api(GatewayOp::GetServiceAddress, e))?;
        Ok(resources::external_address(&service))
    }

    async fn workload_phase(&self, namespace: &str) -> Result<WorkloadPhase> {
        let api: Api<Pod> = self.namespaced(namespace);
        match api.get(resources::WORKLOAD_NAME).await {
            Ok(pod) => Ok(resources::workload_phase(&pod)),
            Err(e) if error::is_not_found(&e) => Ok(WorkloadPhase::Absent),
            Err(e) => Err(KubeError::api(GatewayOp::GetWorkloadPhase, e)),
        }
    }
}
