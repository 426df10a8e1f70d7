//! The resource gateway contract
//!
//! Everything the lifecycle layer does to a cluster goes through this trait, so the
//! orchestrator, poller and reconciler can run against `MockGateway` in tests.

use async_trait::async_trait;
use compute_core::WorkloadPhase;
use std::fmt;

use crate::error::Result;

/// Identifies a gateway operation (for errors, logs and call counting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GatewayOp {
    CreateNamespace,
    DeleteNamespace,
    CreateSshSecret,
    CreateVolumeClaim,
    CreateNetworkPolicy,
    CreateWorkload,
    DeleteWorkload,
    CreateService,
    GetServiceAddress,
    GetWorkloadPhase,
}

impl GatewayOp {
    pub const ALL: [GatewayOp; 10] = [
        GatewayOp::CreateNamespace,
        GatewayOp::DeleteNamespace,
        GatewayOp::CreateSshSecret,
        GatewayOp::CreateVolumeClaim,
        GatewayOp::CreateNetworkPolicy,
        GatewayOp::CreateWorkload,
        GatewayOp::DeleteWorkload,
        GatewayOp::CreateService,
        GatewayOp::GetServiceAddress,
        GatewayOp::GetWorkloadPhase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOp::CreateNamespace => "create namespace",
            GatewayOp::DeleteNamespace => "delete namespace",
            GatewayOp::CreateSshSecret => "create ssh secret",
            GatewayOp::CreateVolumeClaim => "create volume claim",
            GatewayOp::CreateNetworkPolicy => "create network policy",
            GatewayOp::CreateWorkload => "create pod",
            GatewayOp::DeleteWorkload => "delete pod",
            GatewayOp::CreateService => "create service",
            GatewayOp::GetServiceAddress => "get service address",
            GatewayOp::GetWorkloadPhase => "get pod phase",
        }
    }
}

impl fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership metadata recorded on a container namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceOwner {
    pub user_id: i64,
    pub container_id: String,
}

impl NamespaceOwner {
    pub fn new(user_id: i64, container_id: impl Into<String>) -> Self {
        Self {
            user_id,
            container_id: container_id.into(),
        }
    }
}

/// Cluster operations for one container namespace.
///
/// All creates succeed if the resource already exists; all deletes succeed if the
/// resource is already gone. Implementations must be Send + Sync for use across
/// async tasks.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    async fn create_namespace(&self, name: &str, owner: &NamespaceOwner) -> Result<()>;

    /// Delete the namespace and, by cascade, everything in it
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn create_ssh_secret(&self, namespace: &str, authorized_keys: &str) -> Result<()>;

    async fn create_volume_claim(&self, namespace: &str, storage_gb: u32) -> Result<()>;

    async fn create_network_policy(&self, namespace: &str) -> Result<()>;

    async fn create_workload(&self, namespace: &str, image: &str, memory_mb: u32) -> Result<()>;

    async fn delete_workload(&self, namespace: &str) -> Result<()>;

    async fn create_service(&self, namespace: &str) -> Result<()>;

    /// External address of the load balancer, `None` until one is assigned
    async fn service_external_address(&self, namespace: &str) -> Result<Option<String>>;

    async fn workload_phase(&self, namespace: &str) -> Result<WorkloadPhase>;
}
