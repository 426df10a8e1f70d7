//! Compute Store - persistence for Compute
//!
//! This crate provides:
//! - **Record Store traits**: `ContainerStore` for container rows and
//!   `CredentialStore` for SSH and API keys
//! - **SQLite backend**: `SqliteStore`, WAL mode, one connection behind a mutex
//! - **Mock store**: In-memory rows with operation counts and failure injection

pub mod error;
pub mod mock;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use mock::{MockStore, StoreCounts};
pub use sqlite::SqliteStore;
pub use store::{ContainerStore, CredentialStore};
