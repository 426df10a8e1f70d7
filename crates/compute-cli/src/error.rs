//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use compute_core::CoreError;
use compute_kube::KubeError;
use compute_lifecycle::ComputeError;
use compute_store::StoreError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The request was rejected by validation
    #[error("Validation failed: {message}")]
    #[diagnostic(code(compute::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A container or key does not exist for the caller
    #[error("{message}")]
    #[diagnostic(code(compute::cli::not_found))]
    NotFound { message: String },

    /// A per-user cap is reached
    #[error("{message}")]
    #[diagnostic(
        code(compute::cli::limit),
        help("delete an existing one before creating another")
    )]
    LimitExceeded { message: String },

    /// The API key did not resolve to a user
    #[error("Authentication failed: {message}")]
    #[diagnostic(code(compute::cli::auth))]
    Unauthorized { message: String },

    /// Missing or conflicting arguments
    #[error("{message}")]
    #[diagnostic(code(compute::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Configuration or database file problem
    #[error("IO error: {message}")]
    #[diagnostic(code(compute::cli::io))]
    Io { message: String },

    /// The cluster or the record store failed
    #[error("{message}")]
    #[diagnostic(code(compute::cli::upstream))]
    Upstream {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::LimitExceeded { .. } => exit_codes::LIMIT_EXCEEDED,
            CliError::Unauthorized { .. } => exit_codes::AUTH_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Upstream { .. } => exit_codes::UPSTREAM_ERROR,
        }
    }

    /// Create a usage error with help text
    pub fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }
}

impl From<ComputeError> for CliError {
    fn from(err: ComputeError) -> Self {
        match &err {
            ComputeError::Validation(message) => CliError::Validation {
                message: message.clone(),
                help: None,
            },
            ComputeError::LimitExceeded { .. } => CliError::LimitExceeded {
                message: err.to_string(),
            },
            ComputeError::NotFound { .. } => CliError::NotFound {
                message: err.to_string(),
            },
            ComputeError::Upstream { .. } => CliError::Upstream {
                message: err.to_string(),
                help: None,
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::InvalidSshKey { .. } => CliError::Validation {
                message: err.to_string(),
                help: None,
            },
            _ => CliError::Io {
                message: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::Io {
            message: format!("record store: {}", err),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::Upstream {
            message: err.to_string(),
            help: Some("check that KUBECONFIG points at a reachable cluster".to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
