//! Record store traits
//!
//! Each method is a single statement against the backing store; there are no
//! multi-row transactions. Writers that touch disjoint columns of the same row
//! (status vs. external address) never conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compute_core::{ApiKey, Container, ContainerStatus, SshKey};

use crate::error::Result;

/// Container rows
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn create(&self, container: &Container) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Container>>;

    /// All of a user's containers, newest first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Container>>;

    /// Set the status; any status other than `stopped` clears `stopped_at`
    async fn update_status(&self, id: &str, status: ContainerStatus) -> Result<()>;

    /// Record the external address. Returns `false` if one was already set.
    async fn set_external_address(&self, id: &str, address: &str) -> Result<bool>;

    async fn mark_stopped(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remove the row. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Containers counted against the per-user cap (everything not `deleted`)
    async fn count_by_user(&self, user_id: i64) -> Result<usize>;
}

/// SSH key and API key rows
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_ssh_key(
        &self,
        user_id: i64,
        name: &str,
        public_key: &str,
        fingerprint: &str,
    ) -> Result<SshKey>;

    /// A user's keys, newest first
    async fn list_ssh_keys(&self, user_id: i64) -> Result<Vec<SshKey>>;

    /// The subset of `ids` owned by `user_id`, in no particular order
    async fn ssh_keys_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<SshKey>>;

    /// Returns `false` if the key does not exist or belongs to someone else
    async fn delete_ssh_key(&self, user_id: i64, id: i64) -> Result<bool>;

    async fn count_ssh_keys(&self, user_id: i64) -> Result<usize>;

    async fn create_api_key(&self, user_id: i64, name: &str, key_hash: &str) -> Result<ApiKey>;

    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    /// A user's keys, newest first
    async fn list_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>>;

    /// Update `last_used`
    async fn touch_api_key(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete_api_key(&self, user_id: i64, id: i64) -> Result<bool>;

    async fn count_api_keys(&self, user_id: i64) -> Result<usize>;
}
