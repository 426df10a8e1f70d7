//! Compute Kube - Kubernetes integration for Compute
//!
//! This crate provides:
//! - **Resource Gateway**: A narrow trait over the six resource kinds a container
//!   needs (namespace, SSH secret, volume claim, network policy, pod, service)
//! - **Kubernetes driver**: `KubeGateway`, create-or-ignore / delete-or-ignore
//!   semantics on top of `kube`
//! - **Manifest builders**: Pure functions producing the typed resources, testable
//!   without a cluster
//! - **Mock gateway**: In-memory cluster with call counts and failure injection

pub mod client;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod resources;

pub use client::KubeGateway;
pub use error::{KubeError, Result};
pub use gateway::{GatewayOp, NamespaceOwner, ResourceGateway};
pub use mock::{AddressResponse, ClusterNamespace, MockGateway, MockWorkload, OperationCounts};
