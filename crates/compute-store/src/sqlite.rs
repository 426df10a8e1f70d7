//! SQLite-backed record store
//!
//! Features:
//! - WAL mode so readers never block the writer
//! - One connection behind a mutex; each trait call runs on the blocking pool
//! - Timestamps stored as Unix milliseconds

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compute_core::{ApiKey, Container, ContainerStatus, SshKey};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StoreError};
use crate::store::{ContainerStore, CredentialStore};

const CONTAINER_COLUMNS: &str = "id, user_id, name, namespace, status, external_ip, \
     memory_mb, storage_gb, image, created_at, stopped_at";
const SSH_KEY_COLUMNS: &str = "id, user_id, name, public_key, fingerprint, created_at";
const API_KEY_COLUMNS: &str = "id, user_id, name, key_hash, created_at, last_used";

/// SQLite record store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at a specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        tracing::debug!(path = %path.display(), "opened record store");
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the connection on tokio's blocking pool
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }

    /// Initialize database schema
    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS containers (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                namespace TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                external_ip TEXT,
                memory_mb INTEGER NOT NULL,
                storage_gb INTEGER NOT NULL,
                image TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                stopped_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS ssh_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                public_key TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                last_used INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_containers_user_id ON containers(user_id);
            CREATE INDEX IF NOT EXISTS idx_ssh_keys_user_id ON ssh_keys(user_id);
            CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON api_keys(user_id);
            "#,
        )?;

        Ok(())
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Current time at the precision the database keeps
fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

fn container_from_row(row: &Row<'_>) -> rusqlite::Result<Container> {
    let status: String = row.get(4)?;
    let status = status
        .parse::<ContainerStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Container {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        namespace: row.get(3)?,
        status,
        external_ip: row.get(5)?,
        memory_mb: row.get(6)?,
        storage_gb: row.get(7)?,
        image: row.get(8)?,
        created_at: from_millis(row.get(9)?),
        stopped_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
    })
}

fn ssh_key_from_row(row: &Row<'_>) -> rusqlite::Result<SshKey> {
    Ok(SshKey {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        public_key: row.get(3)?,
        fingerprint: row.get(4)?,
        created_at: from_millis(row.get(5)?),
    })
}

fn api_key_from_row(row: &Row<'_>) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        key_hash: row.get(3)?,
        created_at: from_millis(row.get(4)?),
        last_used: row.get::<_, Option<i64>>(5)?.map(from_millis),
    })
}

fn count(conn: &Connection, sql: &str, user_id: i64) -> Result<usize> {
    let n: i64 = conn.query_row(sql, [user_id], |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

#[async_trait]
impl ContainerStore for SqliteStore {
    async fn create(&self, container: &Container) -> Result<()> {
        let container = container.clone();
        self.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO containers (id, user_id, name, namespace, status, external_ip,
                                        memory_mb, storage_gb, image, created_at, stopped_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    container.id,
                    container.user_id,
                    container.name,
                    container.namespace,
                    container.status.as_str(),
                    container.external_ip,
                    container.memory_mb,
                    container.storage_gb,
                    container.image,
                    container.created_at.timestamp_millis(),
                    container.stopped_at.map(|t| t.timestamp_millis()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Container>> {
        let id = id.to_string();
        self.call(move |conn| {
            let container = conn
                .query_row(
                    &format!("SELECT {} FROM containers WHERE id = ?1", CONTAINER_COLUMNS),
                    [&id],
                    container_from_row,
                )
                .optional()?;
            Ok(container)
        })
        .await
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Container>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM containers WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                CONTAINER_COLUMNS
            ))?;
            let containers = stmt
                .query_map([user_id], container_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(containers)
        })
        .await
    }

    async fn update_status(&self, id: &str, status: ContainerStatus) -> Result<()> {
        let id = id.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE containers
                SET status = ?2,
                    stopped_at = CASE WHEN ?2 = 'stopped' THEN stopped_at ELSE NULL END
                WHERE id = ?1
                "#,
                params![id, status.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("container", id));
            }
            Ok(())
        })
        .await
    }

    async fn set_external_address(&self, id: &str, address: &str) -> Result<bool> {
        let id = id.to_string();
        let address = address.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE containers SET external_ip = ?2 WHERE id = ?1 AND external_ip IS NULL",
                params![id, address],
            )?;
            if changed > 0 {
                return Ok(true);
            }

            let exists = conn
                .query_row("SELECT 1 FROM containers WHERE id = ?1", [&id], |_| Ok(()))
                .optional()?
                .is_some();
            if exists {
                Ok(false)
            } else {
                Err(StoreError::not_found("container", id))
            }
        })
        .await
    }

    async fn mark_stopped(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let id = id.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE containers SET status = 'stopped', stopped_at = ?2 WHERE id = ?1",
                params![id, at.timestamp_millis()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("container", id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.call(move |conn| {
            let changed = conn.execute("DELETE FROM containers WHERE id = ?1", [&id])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count_by_user(&self, user_id: i64) -> Result<usize> {
        self.call(move |conn| {
            count(
                conn,
                "SELECT COUNT(*) FROM containers WHERE user_id = ?1 AND status != 'deleted'",
                user_id,
            )
        })
        .await
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn create_ssh_key(
        &self,
        user_id: i64,
        name: &str,
        public_key: &str,
        fingerprint: &str,
    ) -> Result<SshKey> {
        let mut key = SshKey {
            id: 0,
            user_id,
            name: name.to_string(),
            public_key: public_key.to_string(),
            fingerprint: fingerprint.to_string(),
            created_at: now(),
        };
        self.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO ssh_keys (user_id, name, public_key, fingerprint, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    key.user_id,
                    key.name,
                    key.public_key,
                    key.fingerprint,
                    key.created_at.timestamp_millis()
                ],
            )?;
            key.id = conn.last_insert_rowid();
            Ok(key)
        })
        .await
    }

    async fn list_ssh_keys(&self, user_id: i64) -> Result<Vec<SshKey>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM ssh_keys WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                SSH_KEY_COLUMNS
            ))?;
            let keys = stmt
                .query_map([user_id], ssh_key_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn ssh_keys_by_ids(&self, user_id: i64, ids: &[i64]) -> Result<Vec<SshKey>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = ids.to_vec();
        self.call(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM ssh_keys WHERE user_id = ? AND id IN ({})",
                SSH_KEY_COLUMNS, placeholders
            ))?;
            let args = std::iter::once(user_id).chain(ids.iter().copied());
            let keys = stmt
                .query_map(params_from_iter(args), ssh_key_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn delete_ssh_key(&self, user_id: i64, id: i64) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM ssh_keys WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count_ssh_keys(&self, user_id: i64) -> Result<usize> {
        self.call(move |conn| {
            count(conn, "SELECT COUNT(*) FROM ssh_keys WHERE user_id = ?1", user_id)
        })
        .await
    }

    async fn create_api_key(&self, user_id: i64, name: &str, key_hash: &str) -> Result<ApiKey> {
        let mut key = ApiKey {
            id: 0,
            user_id,
            name: name.to_string(),
            key_hash: key_hash.to_string(),
            created_at: now(),
            last_used: None,
        };
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO api_keys (user_id, name, key_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![key.user_id, key.name, key.key_hash, key.created_at.timestamp_millis()],
            )?;
            key.id = conn.last_insert_rowid();
            Ok(key)
        })
        .await
    }

    async fn api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let key_hash = key_hash.to_string();
        self.call(move |conn| {
            let key = conn
                .query_row(
                    &format!("SELECT {} FROM api_keys WHERE key_hash = ?1", API_KEY_COLUMNS),
                    [&key_hash],
                    api_key_from_row,
                )
                .optional()?;
            Ok(key)
        })
        .await
    }

    async fn list_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                API_KEY_COLUMNS
            ))?;
            let keys = stmt
                .query_map([user_id], api_key_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn touch_api_key(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE api_keys SET last_used = ?2 WHERE id = ?1",
                params![id, at.timestamp_millis()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("api key", id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_api_key(&self, user_id: i64, id: i64) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM api_keys WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count_api_keys(&self, user_id: i64) -> Result<usize> {
        self.call(move |conn| {
            count(conn, "SELECT COUNT(*) FROM api_keys WHERE user_id = ?1", user_id)
        })
        .await
    }
}
