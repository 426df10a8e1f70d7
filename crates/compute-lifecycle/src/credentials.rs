//! SSH and API key management
//!
//! Credentials only touch the record store, so they are usable without a
//! cluster connection.

use chrono::Utc;
use compute_core::{
    ApiKey, IssuedApiKey, Limits, Principal, SshKey, generate_api_key, hash_api_key,
    ssh_fingerprint,
};
use compute_store::CredentialStore;
use std::sync::Arc;

use crate::error::{ComputeError, Result};

pub struct CredentialService<S> {
    store: Arc<S>,
    limits: Limits,
}

impl<S> Clone for CredentialService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            limits: self.limits.clone(),
        }
    }
}

impl<S: CredentialStore> CredentialService<S> {
    pub fn new(store: Arc<S>, limits: Limits) -> Self {
        Self { store, limits }
    }

    // ========== SSH keys ==========

    pub async fn add_ssh_key(
        &self,
        principal: &Principal,
        name: &str,
        public_key: &str,
    ) -> Result<SshKey> {
        let name = name.trim();
        let public_key = public_key.trim();
        if name.is_empty() {
            return Err(ComputeError::validation("name is required"));
        }
        if public_key.is_empty() {
            return Err(ComputeError::validation("public_key is required"));
        }
        let fingerprint = ssh_fingerprint(public_key)
            .map_err(|e| ComputeError::validation(e.to_string()))?;

        let count = self
            .store
            .count_ssh_keys(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("count ssh keys", e))?;
        if count >= self.limits.ssh_keys_per_user {
            return Err(ComputeError::LimitExceeded {
                resource: "SSH key",
                limit: self.limits.ssh_keys_per_user,
            });
        }

        let key = self
            .store
            .create_ssh_key(principal.user_id, name, public_key, &fingerprint)
            .await
            .map_err(|e| ComputeError::upstream("create ssh key", e))?;
        tracing::info!(user = principal.user_id, key = key.id, fingerprint = %key.fingerprint, "ssh key added");
        Ok(key)
    }

    pub async fn list_ssh_keys(&self, principal: &Principal) -> Result<Vec<SshKey>> {
        self.store
            .list_ssh_keys(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("list ssh keys", e))
    }

    pub async fn delete_ssh_key(&self, principal: &Principal, id: i64) -> Result<()> {
        let deleted = self
            .store
            .delete_ssh_key(principal.user_id, id)
            .await
            .map_err(|e| ComputeError::upstream("delete ssh key", e))?;
        if !deleted {
            return Err(ComputeError::NotFound { resource: "ssh key" });
        }
        Ok(())
    }

    // ========== API keys ==========

    /// Issue a new API key. The returned secret is not stored and cannot be
    /// recovered later.
    pub async fn create_api_key(&self, principal: &Principal, name: &str) -> Result<IssuedApiKey> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ComputeError::validation("name is required"));
        }

        let count = self
            .store
            .count_api_keys(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("count api keys", e))?;
        if count >= self.limits.api_keys_per_user {
            return Err(ComputeError::LimitExceeded {
                resource: "API key",
                limit: self.limits.api_keys_per_user,
            });
        }

        let (secret, hash) = generate_api_key();
        let key = self
            .store
            .create_api_key(principal.user_id, name, &hash)
            .await
            .map_err(|e| ComputeError::upstream("create api key", e))?;
        tracing::info!(user = principal.user_id, key = key.id, "api key created");
        Ok(IssuedApiKey { key, secret })
    }

    pub async fn list_api_keys(&self, principal: &Principal) -> Result<Vec<ApiKey>> {
        self.store
            .list_api_keys(principal.user_id)
            .await
            .map_err(|e| ComputeError::upstream("list api keys", e))
    }

    pub async fn delete_api_key(&self, principal: &Principal, id: i64) -> Result<()> {
        let deleted = self
            .store
            .delete_api_key(principal.user_id, id)
            .await
            .map_err(|e| ComputeError::upstream("delete api key", e))?;
        if !deleted {
            return Err(ComputeError::NotFound { resource: "api key" });
        }
        Ok(())
    }

    /// Resolve an API key secret to its owner, recording the use
    pub async fn authenticate_api_key(&self, token: &str) -> Result<Option<Principal>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        let key = self
            .store
            .api_key_by_hash(&hash_api_key(token))
            .await
            .map_err(|e| ComputeError::upstream("look up api key", e))?;
        let Some(key) = key else {
            return Ok(None);
        };

        if let Err(e) = self.store.touch_api_key(key.id, Utc::now()).await {
            tracing::warn!(key = key.id, error = %e, "failed to update api key last use");
        }
        Ok(Some(Principal::new(key.user_id)))
    }
}
