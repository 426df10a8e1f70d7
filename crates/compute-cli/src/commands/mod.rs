//! CLI commands

pub mod api_key;
pub mod container;
pub mod ssh_key;

use compute_core::{ComputeConfig, Principal, parse_bearer};
use compute_lifecycle::CredentialService;
use compute_store::SqliteStore;
use std::sync::Arc;

use crate::error::{CliError, Result};

/// How the caller identified themselves on the command line
pub enum Identity {
    UserId(i64),
    ApiKey(String),
}

/// Shared state for every command
pub struct Context {
    pub config: ComputeConfig,
    pub store: Arc<SqliteStore>,
    pub identity: Option<Identity>,
    pub json: bool,
}

impl Context {
    pub fn credentials(&self) -> CredentialService<SqliteStore> {
        CredentialService::new(self.store.clone(), self.config.limits.clone())
    }

    /// Resolve the acting user
    pub async fn principal(&self) -> Result<Principal> {
        match &self.identity {
            Some(Identity::UserId(id)) => Ok(Principal::new(*id)),
            Some(Identity::ApiKey(raw)) => {
                let token = parse_bearer(raw).unwrap_or(raw.trim());
                self.credentials()
                    .authenticate_api_key(token)
                    .await?
                    .ok_or_else(|| CliError::unauthorized("API key not recognized"))
            }
            None => Err(CliError::usage(
                "no user given",
                "pass --user-id or --api-key (or set COMPUTE_API_KEY)",
            )),
        }
    }
}
