//! Authentication state for the storefront client.
//!
//! This module provides:
//! - `Session`: access/refresh token pair plus the user profile returned at login
//! - `CredentialStore`: the single owner of the current session, persisted
//!   through a `KeyValueStore` and observable through a watch channel
//! - `FileStore`, `KeyringStore`, `MemoryStore`: durable storage backends

pub mod session;
pub mod storage;
pub mod store;

pub use session::{Identity, RefreshedTokens, Session};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
pub use store::{CredentialStore, SESSION_KEY};
