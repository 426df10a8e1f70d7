//! Error types for compute-kube

use thiserror::Error;

use crate::gateway::GatewayOp;

/// Result type for compute-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Could not build a client (no kubeconfig / in-cluster config)
    #[error("failed to initialise Kubernetes client: {0}")]
    Client(#[source] kube::Error),

    /// Kubernetes API error while performing a gateway operation
    #[error("{op} failed: {source}")]
    Api {
        op: GatewayOp,
        #[source]
        source: kube::Error,
    },

    /// The operation was refused without an API round-trip
    #[error("{op} rejected: {message}")]
    Rejected { op: GatewayOp, message: String },
}

impl KubeError {
    pub fn api(op: GatewayOp, source: kube::Error) -> Self {
        KubeError::Api { op, source }
    }

    pub fn rejected(op: GatewayOp, message: impl Into<String>) -> Self {
        KubeError::Rejected {
            op,
            message: message.into(),
        }
    }

    /// The gateway operation that failed, if any
    pub fn op(&self) -> Option<GatewayOp> {
        match self {
            KubeError::Api { op, .. } | KubeError::Rejected { op, .. } => Some(*op),
            KubeError::Client(_) => None,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api { source, .. } if is_not_found(source))
    }

    /// Check if this is a conflict error (409), i.e. the resource already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, KubeError::Api { source, .. } if is_already_exists(source))
    }
}

/// 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// 409 from the API server
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classifies_by_status_code() {
        let not_found = KubeError::api(GatewayOp::DeleteNamespace, api_error(404, "NotFound"));
        assert!(not_found.is_not_found());
        assert!(!not_found.is_already_exists());

        let exists = KubeError::api(GatewayOp::CreateNamespace, api_error(409, "AlreadyExists"));
        assert!(exists.is_already_exists());
        assert!(!exists.is_not_found());

        let forbidden = KubeError::api(GatewayOp::CreateWorkload, api_error(403, "Forbidden"));
        assert!(!forbidden.is_not_found());
        assert!(!forbidden.is_already_exists());
    }

    #[test]
    fn test_message_text_is_not_inspected() {
        // A 500 whose message mentions "not found" is still an ordinary failure
        let err = KubeError::api(
            GatewayOp::GetWorkloadPhase,
            kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "pod not found in cache".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            }),
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_op_is_reported() {
        let err = KubeError::rejected(GatewayOp::CreateService, "quota exceeded");
        assert_eq!(err.op(), Some(GatewayOp::CreateService));
        assert_eq!(err.to_string(), "create service rejected: quota exceeded");
    }
}
