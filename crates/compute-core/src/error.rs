//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid SSH public key: {reason}")]
    InvalidSshKey { reason: String },

    #[error("Unknown container status: {value}")]
    UnknownStatus { value: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
