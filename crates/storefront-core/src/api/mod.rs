//! REST API client module for the storefront backend.
//!
//! This module provides the `AuthClient`, which attaches the stored bearer
//! token to every request and transparently renews an expired access token
//! with the refresh token before replaying the request once.
//!
//! The backend issues JWT access/refresh pairs from `/api/users/login/` and
//! `/api/users/register/` and renews them at `/api/users/refresh/`.

pub mod client;
pub mod error;
pub mod redirect;
pub mod request;
pub mod transport;

pub use client::{AuthClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use redirect::{LogRedirect, LoginRedirect};
pub use request::{ApiRequest, ApiResponse, RequestEnvelope};
pub use transport::{ReqwestTransport, Transport};
