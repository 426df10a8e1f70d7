//! Compute Lifecycle - the container lifecycle orchestrator
//!
//! This crate provides:
//! - **Provisioner**: the ordered six-step resource sequence behind one deadline
//! - **Endpoint poller**: background discovery of the load balancer address
//! - **Reconciler**: read-time correction of stored status from the live workload
//! - **Task supervisor**: owns detached tasks and their deadlines
//! - **ComputeService**: the operations a request layer calls, scoped to a principal
//! - **CredentialService**: SSH and API key management, usable without a cluster

pub mod credentials;
pub mod error;
pub mod poller;
pub mod provision;
pub mod reconcile;
pub mod service;
pub mod supervisor;

pub use credentials::CredentialService;
pub use error::{ComputeError, Result, UpstreamError};
pub use poller::{EndpointPoller, PollOutcome};
pub use provision::{ProvisionOutcome, ProvisionStep, Provisioner};
pub use reconcile::Reconciler;
pub use service::ComputeService;
pub use supervisor::TaskSupervisor;
