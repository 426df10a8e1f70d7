//! Compute Core - Core types and utilities for per-user sandboxed environments
//!
//! This crate provides the foundational types used throughout Compute:
//! - `Container`: The lifecycle-managed unit (one Kubernetes namespace each)
//! - `SshKey` / `ApiKey`: User credentials and their derived fingerprints/hashes
//! - `Principal`: The caller identity passed explicitly to every operation
//! - `ComputeConfig`: Defaults, limits, timeouts and cluster settings

pub mod config;
pub mod container;
pub mod credentials;
pub mod error;
pub mod principal;

pub use config::{ClusterConfig, ComputeConfig, DatabaseConfig, Defaults, Limits, Timeouts};
pub use container::{
    Container, ContainerStatus, NewContainer, WorkloadPhase, generate_container_id,
    namespace_for,
};
pub use credentials::{
    ApiKey, IssuedApiKey, SshKey, authorized_keys, generate_api_key, hash_api_key,
    parse_bearer, ssh_fingerprint, validate_ssh_public_key,
};
pub use error::{CoreError, Result};
pub use principal::Principal;
