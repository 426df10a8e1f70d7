//! Mock resource gateway for testing
//!
//! Keeps an in-memory picture of each container namespace so tests can assert on
//! what was created, and lets them inject failures, hangs and address sequences
//! without a cluster.

use async_trait::async_trait;
use compute_core::WorkloadPhase;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::{KubeError, Result};
use crate::gateway::{GatewayOp, NamespaceOwner, ResourceGateway};

/// The workload as the mock cluster sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockWorkload {
    pub image: String,
    pub memory_mb: u32,
    pub phase: WorkloadPhase,
}

/// Everything that exists inside one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNamespace {
    pub owner: NamespaceOwner,
    pub authorized_keys: Option<String>,
    pub volume_claim_gb: Option<u32>,
    pub network_policy: bool,
    pub workload: Option<MockWorkload>,
    pub service: bool,
    /// Address reported once the service exists
    pub external_address: Option<String>,
}

impl ClusterNamespace {
    fn new(owner: NamespaceOwner) -> Self {
        Self {
            owner,
            authorized_keys: None,
            volume_claim_gb: None,
            network_policy: false,
            workload: None,
            service: false,
            external_address: None,
        }
    }
}

/// One scripted answer to an address query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressResponse {
    Pending,
    Assigned(String),
    Error(String),
}

/// Counts of gateway calls for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    counts: BTreeMap<GatewayOp, usize>,
}

impl OperationCounts {
    pub fn get(&self, op: GatewayOp) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Calls to any operation other than the ones listed
    pub fn others(&self, except: &[GatewayOp]) -> usize {
        self.counts
            .iter()
            .filter(|(op, _)| !except.contains(op))
            .map(|(_, n)| n)
            .sum()
    }
}

#[derive(Default)]
struct MockState {
    namespaces: HashMap<String, ClusterNamespace>,
    failures: HashMap<GatewayOp, String>,
    hangs: HashSet<GatewayOp>,
    address_script: VecDeque<AddressResponse>,
    calls: Vec<(GatewayOp, String)>,
    counts: OperationCounts,
}

/// In-memory resource gateway for testing
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `op` fail with `message`
    pub fn fail_on(&self, op: GatewayOp, message: impl Into<String>) {
        self.state.write().unwrap().failures.insert(op, message.into());
    }

    /// Make every call to `op` wait forever
    pub fn hang_on(&self, op: GatewayOp) {
        self.state.write().unwrap().hangs.insert(op);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.write().unwrap();
        state.failures.clear();
        state.hangs.clear();
    }

    /// Queue answers for the next address queries; once drained, the namespace's
    /// own `external_address` is reported
    pub fn script_addresses<I>(&self, responses: I)
    where
        I: IntoIterator<Item = AddressResponse>,
    {
        self.state
            .write()
            .unwrap()
            .address_script
            .extend(responses);
    }

    pub fn assign_address(&self, namespace: &str, address: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        if let Some(ns) = state.namespaces.get_mut(namespace) {
            ns.external_address = Some(address.into());
        }
    }

    pub fn set_phase(&self, namespace: &str, phase: WorkloadPhase) {
        let mut state = self.state.write().unwrap();
        if let Some(workload) = state
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.workload.as_mut())
        {
            workload.phase = phase;
        }
    }

    /// Pre-populate a namespace, as if provisioned earlier
    pub fn insert_namespace(&self, name: impl Into<String>, namespace: ClusterNamespace) {
        self.state
            .write()
            .unwrap()
            .namespaces
            .insert(name.into(), namespace);
    }

    pub fn namespace(&self, name: &str) -> Option<ClusterNamespace> {
        self.state.read().unwrap().namespaces.get(name).cloned()
    }

    pub fn namespace_count(&self) -> usize {
        self.state.read().unwrap().namespaces.len()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.state.read().unwrap().counts.clone()
    }

    /// Every call in order, with the namespace it targeted
    pub fn calls(&self) -> Vec<(GatewayOp, String)> {
        self.state.read().unwrap().calls.clone()
    }

    /// Reset operation counts and the call log
    pub fn reset_counts(&self) {
        let mut state = self.state.write().unwrap();
        state.counts = OperationCounts::default();
        state.calls.clear();
    }

    /// Record a call and apply injected faults. Returns whether the call should hang.
    fn enter(&self, op: GatewayOp, namespace: &str) -> Result<bool> {
        let mut state = self.state.write().unwrap();
        *state.counts.counts.entry(op).or_insert(0) += 1;
        state.calls.push((op, namespace.to_string()));

        if let Some(message) = state.failures.get(&op) {
            return Err(KubeError::rejected(op, message.clone()));
        }
        Ok(state.hangs.contains(&op))
    }

    async fn begin(&self, op: GatewayOp, namespace: &str) -> Result<()> {
        if self.enter(op, namespace)? {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    /// Apply `f` to an existing namespace
    fn within<T>(
        &self,
        op: GatewayOp,
        namespace: &str,
        f: impl FnOnce(&mut ClusterNamespace) -> T,
    ) -> Result<T> {
        let mut state = self.state.write().unwrap();
        match state.namespaces.get_mut(namespace) {
            Some(ns) => Ok(f(ns)),
            None => Err(KubeError::rejected(
                op,
                format!("namespace {} not found", namespace),
            )),
        }
    }
}

#[async_trait]
impl ResourceGateway for MockGateway {
    async fn create_namespace(&self, name: &str, owner: &NamespaceOwner) -> Result<()> {
        self.begin(GatewayOp::CreateNamespace, name).await?;
        self.state
            .write()
            .unwrap()
            .namespaces
            .entry(name.to_string())
            .or_insert_with(|| ClusterNamespace::new(owner.clone()));
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.begin(GatewayOp::DeleteNamespace, name).await?;
        self.state.write().unwrap().namespaces.remove(name);
        Ok(())
    }

    async fn create_ssh_secret(&self, namespace: &str, authorized_keys: &str) -> Result<()> {
        let op = GatewayOp::CreateSshSecret;
        self.begin(op, namespace).await?;
        self.within(op, namespace, |ns| {
            ns.authorized_keys
                .get_or_insert_with(|| authorized_keys.to_string());
        })
    }

    async fn create_volume_claim(&self, namespace: &str, storage_gb: u32) -> Result<()> {
        let op = GatewayOp::CreateVolumeClaim;
        self.begin(op, namespace).await?;
        self.within(op, namespace, |ns| {
            ns.volume_claim_gb.get_or_insert(storage_gb);
        })
    }

    async fn create_network_policy(&self, namespace: &str) -> Result<()> {
        let op = GatewayOp::CreateNetworkPolicy;
        self.begin(op, namespace).await?;
        self.within(op, namespace, |ns| ns.network_policy = true)
    }

    async fn create_workload(&self, namespace: &str, image: &str, memory_mb: u32) -> Result<()> {
        let op = GatewayOp::CreateWorkload;
        self.begin(op, namespace).await?;
        self.within(op, namespace, |ns| {
            ns.workload.get_or_insert_with(|| MockWorkload {
                image: image.to_string(),
                memory_mb,
                phase: WorkloadPhase::Pending,
            });
        })
    }

    async fn delete_workload(&self, namespace: &str) -> Result<()> {
        self.begin(GatewayOp::DeleteWorkload, namespace).await?;
        if let Some(ns) = self.state.write().unwrap().namespaces.get_mut(namespace) {
            ns.workload = None;
        }
        Ok(())
    }

    async fn create_service(&self, namespace: &str) -> Result<()> {
        let op = GatewayOp::CreateService;
        self.begin(op, namespace).await?;
        self.within(op, namespace, |ns| ns.service = true)
    }

    async fn service_external_address(&self, namespace: &str) -> Result<Option<String>> {
        let op = GatewayOp::GetServiceAddress;
        self.begin(op, namespace).await?;

        let scripted = self.state.write().unwrap().address_script.pop_front();
        match scripted {
            Some(AddressResponse::Pending) => Ok(None),
            Some(AddressResponse::Error(message)) => Err(KubeError::rejected(op, message)),
            Some(AddressResponse::Assigned(address)) => {
                self.within(op, namespace, |ns| {
                    ns.external_address = Some(address.clone());
                })?;
                Ok(Some(address))
            }
            None => self.within(op, namespace, |ns| {
                if ns.service {
                    ns.external_address.clone()
                } else {
                    None
                }
            }),
        }
    }

    async fn workload_phase(&self, namespace: &str) -> Result<WorkloadPhase> {
        self.begin(GatewayOp::GetWorkloadPhase, namespace).await?;
        let state = self.state.read().unwrap();
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.workload.as_ref())
            .map(|w| w.phase)
            .unwrap_or(WorkloadPhase::Absent))
    }
}
