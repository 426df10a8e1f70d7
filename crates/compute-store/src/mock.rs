//! Mock record store for testing
//!
//! Stores rows in memory, useful for lifecycle tests without a database file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compute_core::{ApiKey, Container, ContainerStatus, SshKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::{Result, StoreError};
use crate::store::{ContainerStore, CredentialStore};

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub counts: usize,
}

#[derive(Default)]
struct MockData {
    containers: HashMap<String, Container>,
    /// Insertion order, used to break `created_at` ties
    container_order: Vec<String>,
    ssh_keys: Vec<SshKey>,
    api_keys: Vec<ApiKey>,
    next_id: i64,
    failing: HashSet<&'static str>,
    counts: StoreCounts,
}

impl MockData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, method: &'static str) -> Result<()> {
        if self.failing.contains(method) {
            return Err(StoreError::Unavailable {
                message: format!("{} failed", method),
            });
        }
        Ok(())
    }
}

/// In-memory record store for testing
#[derive(Clone, Default)]
pub struct MockStore {
    data: Arc<RwLock<MockData>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named trait method (e.g. `"mark_stopped"`) fail
    pub fn fail_on(&self, method: &'static str) {
        self.data.write().unwrap().failing.insert(method);
    }

    pub fn clear_failures(&self) {
        self.data.write().unwrap().failing.clear();
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> StoreCounts {
        self.data.read().unwrap().counts.clone()
    }

    pub fn reset_counts(&self) {
        self.data.write().unwrap().counts = StoreCounts::default();
    }

    /// Count total container rows
    pub fn container_count(&self) -> usize {
        self.data.read().unwrap().containers.len()
    }

    /// Read a row without touching the counters
    pub fn peek(&self, id: &str) -> Option<Container> {
        self.data.read().unwrap().containers.get(id).cloned()
    }

    fn update<T>(
        &self,
        method: &'static str,
        f: impl FnOnce(&mut MockData) -> Result<T>,
    ) -> Result<T> {
        let mut data = self.data.write().unwrap();
        data.check(method)?;
        f(&mut data)
    }
}

fn newest_first<T>(items: &mut [(usize, T)], created: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|(ia, a), (ib, b)| created(b).cmp(&created(a)).then(ib.cmp(ia)));
}

#[async_trait]
impl ContainerStore for MockStore {
    async fn create(&self, container: &Container) -> Result<()> {
        self.update("create", |data| {
            data.counts.creates += 1;
            data.containers
                .insert(container.id.clone(), container.clone());
            data.container_order.push(container.id.clone());
            Ok(())
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Container>> {
        self.update("get", |data| {
            data.counts.gets += 1;
            Ok(data.containers.get(id).cloned())
        })
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Container>> {
        self.update("list_by_user", |data| {
            data.counts.lists += 1;
            let mut rows: Vec<(usize, Container)> = data
                .container_order
                .iter()
                .enumerate()
                .filter_map(|(i, id)| data.containers.get(id).map(|c| (i, c.clone())))
                .filter(|(_, c)| c.user_id == user_id)
                .collect();
            newest_first(&mut rows, |c| c.created_at);
            Ok(rows.into_iter().map(|(_, c)| c).collect())
        })
    }

    async fn update_status(&self, id: &str, status: ContainerStatus) -> Result<()> {
        self.update("update_status", |data| {
            data.counts.updates += 1;
            let container = data
                .containers
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("container", id))?;
            container.set_status(status);
            Ok(())
        })
    }

    async fn set_external_address(&self, id: &str, address: &str) -> Result<bool> {
        self.update("set_external_address", |data| {
            data.counts.updates += 1;
            let container = data
                .containers
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("container", id))?;
            if container.external_ip.is_some() {
                return Ok(false);
            }
            container.external_ip = Some(address.to_string());
            Ok(true)
        })
    }

    async fn mark_stopped(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.update("mark_stopped", |data| {
            data.counts.updates += 1;
            let container = data
                .containers
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("container", id))?;
            container.mark_stopped(at);
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.update("delete", |data| {
            data.counts.deletes += 1;
            data.container_order.retain(|existing| existing != id);
            Ok(data.containers.remove(id).is_some())
        })
    }

    async fn count_by_user(&self, user_id: i64) -> Result<usize> {
        self.update("count_by_user", |data| {
            data.counts.counts += 1;
            Ok(data
                .containers
                .values()
                .filter(|c| c.user_id == user_id && c.status != ContainerStatus::Deleted)
                .count())
        })
    }
}

#[async_trait]
impl CredentialStore for MockStore {
    async fn create_ssh_key(
        &self,
        user_id: i64,
        name: &str,
        public_key: &str,
        fingerprint: &str,
    ) -> Result<SshKey> {
        self.update("create_ssh_key", |data| {
            data.counts.creates += 1;
            let key = SshKey {
                id: data.next_id(),
                user_id,
                name: name.to_string(),
                public_key: public_key.to_string(),
                fingerprint: fingerprint.to_string(),
                created_at: Utc::now(),
            };
            data.ssh_keys.push(key.clone());
            Ok(key)
        })
    }

    async fn list_ssh_keys(&self, user_id: i64) -> Result<Vec<SshKey>> {
        self.update("list_ssh_keys", |data| {
            data.counts.lists += 1;
            let mut rows: Vec<(usize, SshKey)> = data
                .ssh_keys
                .iter()
                .filter(|k| k.user_id == user_id)
                .cloned()
                .enumerate()
                .collect();
            newest_first(&mut rows, |k| k.created_at);
            Ok(rows.into_iter().map(|(_, k)| k).collect())
        })
    }

    async fn ssh_keys_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<SshKey>> {
        self.update("ssh_keys_by_ids", |data| {
            data.counts.gets += 1;
            Ok(data
                .ssh_keys
                .iter()
                .filter(|k| k.user_id == user_id && ids.contains(&k.id))
                .cloned()
                .collect())
        })
    }

    async fn delete_ssh_key(&self, user_id: i64, id: i64) -> Result<bool> {
        self.update("delete_ssh_key", |data| {
            data.counts.deletes += 1;
            let before = data.ssh_keys.len();
            data.ssh_keys
                .retain(|k| !(k.id == id && k.user_id == user_id));
            Ok(data.ssh_keys.len() < before)
        })
    }

    async fn count_ssh_keys(&self, user_id: i64) -> Result<usize> {
        self.update("count_ssh_keys", |data| {
            data.counts.counts += 1;
            Ok(data.ssh_keys.iter().filter(|k| k.user_id == user_id).count())
        })
    }

    async fn create_api_key(&self, user_id: i64, name: &str, key_hash: &str) -> Result<ApiKey> {
        self.update("create_api_key", |data| {
            data.counts.creates += 1;
            let key = ApiKey {
                id: data.next_id(),
                user_id,
                name: name.to_string(),
                key_hash: key_hash.to_string(),
                created_at: Utc::now(),
                last_used: None,
            };
            data.api_keys.push(key.clone());
            Ok(key)
        })
    }

    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        self.update("api_key_by_hash", |data| {
            data.counts.gets += 1;
            Ok(data.api_keys.iter().find(|k| k.key_hash == key_hash).cloned())
        })
    }

    async fn list_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>> {
        self.update("list_api_keys", |data| {
            data.counts.lists += 1;
            let mut rows: Vec<(usize, ApiKey)> = data
                .api_keys
                .iter()
                .filter(|k| k.user_id == user_id)
                .cloned()
                .enumerate()
                .collect();
            newest_first(&mut rows, |k| k.created_at);
            Ok(rows.into_iter().map(|(_, k)| k).collect())
        })
    }

    async fn touch_api_key(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.update("touch_api_key", |data| {
            data.counts.updates += 1;
            let key = data
                .api_keys
                .iter_mut()
                .find(|k| k.id == id)
                .ok_or_else(|| StoreError::not_found("api key", id))?;
            key.last_used = Some(at);
            Ok(())
        })
    }

    async fn delete_api_key(&self, user_id: i64, id: i64) -> Result<bool> {
        self.update("delete_api_key", |data| {
            data.counts.deletes += 1;
            let before = data.api_keys.len();
            data.api_keys
                .retain(|k| !(k.id == id && k.user_id == user_id));
            Ok(data.api_keys.len() < before)
        })
    }

    async fn count_api_keys(&self, user_id: i64) -> Result<usize> {
        self.update("count_api_keys", |data| {
            data.counts.counts += 1;
            Ok(data.api_keys.iter().filter(|k| k.user_id == user_id).count())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_behaves_like_sqlite_for_status() {
        let store = MockStore::new();
        let container = Container::with_id("deadbeef", 1, "dev1", 512, 5, "img");
        store.create(&container).await.unwrap();

        store.mark_stopped("deadbeef", Utc::now()).await.unwrap();
        store
            .update_status("deadbeef", ContainerStatus::Pending)
            .await
            .unwrap();
        assert!(store.peek("deadbeef").unwrap().stopped_at.is_none());

        assert!(store.set_external_address("deadbeef", "a").await.unwrap());
        assert!(!store.set_external_address("deadbeef", "b").await.unwrap());
        assert_eq!(store.peek("deadbeef").unwrap().external_ip.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_ties() {
        let store = MockStore::new();
        let now = Utc::now();
        for id in ["00000001", "00000002", "00000003"] {
            let mut container = Container::with_id(id, 1, id, 512, 5, "img");
            container.created_at = now;
            store.create(&container).await.unwrap();
        }

        let ids: Vec<String> = store
            .list_by_user(1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["00000003", "00000002", "00000001"]);
    }

    #[tokio::test]
    async fn test_fail_on() {
        let store = MockStore::new();
        store.fail_on("count_by_user");
        assert!(matches!(
            store.count_by_user(1).await,
            Err(StoreError::Unavailable { .. })
        ));

        store.clear_failures();
        assert_eq!(store.count_by_user(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts() {
        let store = MockStore::new();
        store.create_ssh_key(1, "k", "ssh-rsa AAAA", "fp").await.unwrap();
        store.list_ssh_keys(1).await.unwrap();
        store.get("x").await.unwrap();

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.lists, 1);
        assert_eq!(counts.gets, 1);

        store.reset_counts();
        assert_eq!(store.operation_counts(), StoreCounts::default());
    }
}
