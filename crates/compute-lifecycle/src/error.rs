//! Error types for compute-lifecycle

use compute_kube::KubeError;
use compute_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Errors returned to the request layer
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} limit reached ({limit})")]
    LimitExceeded { resource: &'static str, limit: usize },

    /// Missing, or owned by someone else
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("{context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: UpstreamError,
    },
}

/// The collaborator failure behind an `Upstream` error
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] KubeError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ComputeError {
    pub fn validation(message: impl Into<String>) -> Self {
        ComputeError::Validation(message.into())
    }

    /// Wrap a collaborator failure, logging it with its context
    pub fn upstream(context: impl Into<String>, source: impl Into<UpstreamError>) -> Self {
        let context = context.into();
        let source = source.into();
        tracing::error!(error = %source, "{}", context);
        ComputeError::Upstream { context, source }
    }

    /// HTTP status a request layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ComputeError::Validation(_) | ComputeError::LimitExceeded { .. } => 400,
            ComputeError::NotFound { .. } => 404,
            ComputeError::Upstream { .. } => 500,
        }
    }

    /// Message safe to show the caller; upstream detail stays in the logs
    pub fn public_message(&self) -> String {
        match self {
            ComputeError::Upstream { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
