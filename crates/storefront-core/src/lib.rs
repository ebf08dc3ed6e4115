//! Core library for the storefront client.
//!
//! - [`auth`]: the session model and the credential store that owns it
//! - [`api`]: the authenticated request pipeline and account operations
//! - [`config`]: on-disk configuration and storage backend selection

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, ApiRequest, ApiResponse, AuthClient, LoginRedirect};
pub use auth::{CredentialStore, Identity, Session};
pub use config::Config;
