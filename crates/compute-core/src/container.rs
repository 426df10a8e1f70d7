//! Container records and their lifecycle vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Prefix of every container namespace
pub const NAMESPACE_PREFIX: &str = "compute";

/// Derive the namespace name for a container.
///
/// This is a pure function of its inputs: the same user and container ID always
/// produce the same name, and distinct container IDs never collide.
pub fn namespace_for(user_id: i64, container_id: &str) -> String {
    format!("{}-{}-{}", NAMESPACE_PREFIX, user_id, container_id)
}

/// Generate a fresh container ID (8 lowercase hex characters)
pub fn generate_container_id() -> String {
    let bytes: [u8; 4] = rand::random();
    hex::encode(bytes)
}

/// Persisted container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Pending,
    Running,
    Stopped,
    Failed,
    Deleted,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            other => Err(CoreError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Live phase of a container's workload as observed on the cluster.
///
/// `Absent` and `Unknown` are read-only signals and never map to a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The workload resource does not exist
    Absent,
    /// Any phase the cluster reports that we do not recognise
    Unknown,
}

impl WorkloadPhase {
    /// Parse a Kubernetes pod phase string
    pub fn from_pod_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// The stored status this phase corresponds to, if any
    pub fn observed_status(&self) -> Option<ContainerStatus> {
        match self {
            Self::Pending => Some(ContainerStatus::Pending),
            Self::Running => Some(ContainerStatus::Running),
            Self::Succeeded => Some(ContainerStatus::Stopped),
            Self::Failed => Some(ContainerStatus::Failed),
            Self::Absent | Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "stopped",
            Self::Failed => "failed",
            Self::Absent => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to create a container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContainer {
    pub name: String,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub storage_gb: Option<u32>,
    #[serde(default)]
    pub ssh_key_ids: Vec<i64>,
}

impl NewContainer {
    pub fn new(name: impl Into<String>, ssh_key_ids: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            memory_mb: None,
            storage_gb: None,
            ssh_key_ids,
        }
    }

    /// Requested memory, or `default` when unset or zero
    pub fn memory_or(&self, default: u32) -> u32 {
        self.memory_mb.filter(|m| *m > 0).unwrap_or(default)
    }

    /// Requested storage, or `default` when unset or zero
    pub fn storage_or(&self, default: u32) -> u32 {
        self.storage_gb.filter(|s| *s > 0).unwrap_or(default)
    }
}

/// A user's sandboxed environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub namespace: String,
    pub status: ContainerStatus,
    pub external_ip: Option<String>,
    pub memory_mb: u32,
    pub storage_gb: u32,
    pub image: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Container {
    /// Build a new pending container with a freshly generated ID
    pub fn pending(
        user_id: i64,
        name: impl Into<String>,
        memory_mb: u32,
        storage_gb: u32,
        image: impl Into<String>,
    ) -> Self {
        Self::with_id(
            generate_container_id(),
            user_id,
            name,
            memory_mb,
            storage_gb,
            image,
        )
    }

    /// Build a new pending container with a known ID
    pub fn with_id(
        id: impl Into<String>,
        user_id: i64,
        name: impl Into<String>,
        memory_mb: u32,
        storage_gb: u32,
        image: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            namespace: namespace_for(user_id, &id),
            id,
            user_id,
            name: name.into(),
            status: ContainerStatus::Pending,
            external_ip: None,
            memory_mb,
            storage_gb,
            image: image.into(),
            created_at: Utc::now(),
            stopped_at: None,
        }
    }

    /// SSH command for reaching the container, once it has an address
    pub fn ssh_command(&self) -> Option<String> {
        self.external_ip
            .as_ref()
            .map(|ip| format!("ssh root@{}", ip))
    }

    pub fn mark_stopped(&mut self, at: DateTime<Utc>) {
        self.status = ContainerStatus::Stopped;
        self.stopped_at = Some(at);
    }

    /// Set the status; leaving `stopped` clears the stop timestamp
    pub fn set_status(&mut self, status: ContainerStatus) {
        self.status = status;
        if status != ContainerStatus::Stopped {
            self.stopped_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_deterministic() {
        assert_eq!(namespace_for(7, "a1b2c3d4"), "compute-7-a1b2c3d4");
        assert_eq!(namespace_for(7, "a1b2c3d4"), namespace_for(7, "a1b2c3d4"));
        assert_ne!(namespace_for(7, "a1b2c3d4"), namespace_for(8, "a1b2c3d4"));
        assert_ne!(namespace_for(7, "a1b2c3d4"), namespace_for(7, "a1b2c3d5"));
    }

    #[test]
    fn test_container_id_shape() {
        for _ in 0..32 {
            let id = generate_container_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_pending_container_derives_namespace() {
        let container = Container::with_id("deadbeef", 42, "dev1", 512, 5, "img:latest");
        assert_eq!(container.namespace, "compute-42-deadbeef");
        assert_eq!(container.status, ContainerStatus::Pending);
        assert!(container.external_ip.is_none());
        assert!(container.ssh_command().is_none());
    }

    #[test]
    fn test_ssh_command() {
        let mut container = Container::with_id("deadbeef", 1, "dev1", 512, 5, "img");
        container.external_ip = Some("203.0.113.9".to_string());
        assert_eq!(container.ssh_command().as_deref(), Some("ssh root@203.0.113.9"));
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            ContainerStatus::Pending,
            ContainerStatus::Running,
            ContainerStatus::Stopped,
            ContainerStatus::Failed,
            ContainerStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<ContainerStatus>().unwrap(), status);
        }
        assert!("not_found".parse::<ContainerStatus>().is_err());
        assert!("unknown".parse::<ContainerStatus>().is_err());
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(WorkloadPhase::Pending.observed_status(), Some(ContainerStatus::Pending));
        assert_eq!(WorkloadPhase::Running.observed_status(), Some(ContainerStatus::Running));
        assert_eq!(WorkloadPhase::Succeeded.observed_status(), Some(ContainerStatus::Stopped));
        assert_eq!(WorkloadPhase::Failed.observed_status(), Some(ContainerStatus::Failed));
        assert_eq!(WorkloadPhase::Absent.observed_status(), None);
        assert_eq!(WorkloadPhase::Unknown.observed_status(), None);
    }

    #[test]
    fn test_pod_phase_parsing() {
        assert_eq!(WorkloadPhase::from_pod_phase(Some("Running")), WorkloadPhase::Running);
        assert_eq!(WorkloadPhase::from_pod_phase(Some("Succeeded")), WorkloadPhase::Succeeded);
        assert_eq!(WorkloadPhase::from_pod_phase(Some("Evicted")), WorkloadPhase::Unknown);
        assert_eq!(WorkloadPhase::from_pod_phase(None), WorkloadPhase::Unknown);
    }

    #[test]
    fn test_request_defaults() {
        let mut request = NewContainer::new("dev1", vec![1]);
        assert_eq!(request.memory_or(512), 512);
        assert_eq!(request.storage_or(5), 5);

        request.memory_mb = Some(0);
        request.storage_gb = Some(20);
        assert_eq!(request.memory_or(512), 512);
        assert_eq!(request.storage_or(5), 20);
    }

    #[test]
    fn test_leaving_stopped_clears_timestamp() {
        let mut container = Container::with_id("deadbeef", 1, "dev1", 512, 5, "img");
        container.mark_stopped(Utc::now());
        assert!(container.stopped_at.is_some());

        container.set_status(ContainerStatus::Pending);
        assert!(container.stopped_at.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
