//! Authenticated client for the storefront REST API.
//!
//! Every request passes through two stages. The outbound stage attaches the
//! current access token. The inbound stage watches for a 401, renews the
//! access token with the refresh token and replays the request once. When the
//! token cannot be renewed the session is cleared and the user is sent back
//! to the login entry point.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, RefreshedTokens, Session};

use super::redirect::LoginRedirect;
use super::request::{ApiRequest, ApiResponse, RequestEnvelope};
use super::transport::{ReqwestTransport, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Backend used when neither config nor environment names one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

const LOGIN_PATH: &str = "/api/users/login/";
const REGISTER_PATH: &str = "/api/users/register/";
const REFRESH_PATH: &str = "/api/users/refresh/";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// API client that keeps the caller logged in.
/// Clone is cheap - all state is shared behind `Arc`s.
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    redirect: Arc<dyn LoginRedirect>,
    /// Serializes token renewal so a burst of 401s costs one refresh call
    refresh_gate: Arc<Mutex<()>>,
}

impl AuthClient {
    /// Create a client that talks to `base_url` over HTTP
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(base_url, store, transport, redirect))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            transport,
            redirect,
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    // ===== Account =====

    /// Log in with username (the storefront uses the email) and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let request =
            ApiRequest::post(self.resolve(LOGIN_PATH)).json(&LoginRequest { username, password })?;
        self.authenticate(request).await
    }

    /// Create an account; a successful registration logs the user in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = ApiRequest::post(self.resolve(REGISTER_PATH)).json(&RegisterRequest {
            name,
            email,
            password,
        })?;
        self.authenticate(request).await
    }

    /// Forget the current session. Returns whether one was present.
    pub fn logout(&self) -> bool {
        self.store.clear_session()
    }

    /// Login and register bypass the pipeline: a 401 here means bad
    /// credentials, not an expired token.
    async fn authenticate(&self, request: ApiRequest) -> Result<Session, ApiError> {
        let response = self.transport.send(&request).await?;
        let status = response.status();
        if status.is_client_error() {
            return Err(ApiError::login_failed(status, &response.text()));
        }
        let response = response.error_for_status()?;

        let session: Session = response.json()?;
        if !session.is_complete() {
            return Err(ApiError::InvalidResponse(
                "Login response is missing a token".to_string(),
            ));
        }

        info!(user_id = ?session.identity.user_id(), "Logged in");
        self.store.set_session(session.clone());
        Ok(session)
    }

    // ===== Pipeline =====

    /// Outbound stage: attach the current access token, or send unauthenticated.
    pub fn authorize(&self, envelope: &mut RequestEnvelope) {
        match self.store.access_token() {
            Some(token) => envelope.set_bearer(&token),
            None => envelope.clear_bearer(),
        }
    }

    /// Send a request through the pipeline.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.send(RequestEnvelope::new(request)).await
    }

    /// Send an envelope through the pipeline. 2xx responses come back as
    /// `Ok`; everything else as the matching [`ApiError`].
    pub async fn send(&self, mut envelope: RequestEnvelope) -> Result<ApiResponse, ApiError> {
        let url = self.resolve(&envelope.request().url);
        envelope.request_mut().url = url;

        self.authorize(&mut envelope);
        let response = self.transport.send(envelope.request()).await?;
        self.inbound(envelope, response).await
    }

    /// Inbound stage: pass through anything but a 401, otherwise renew the
    /// access token and replay the request exactly once.
    async fn inbound(
        &self,
        mut envelope: RequestEnvelope,
        response: ApiResponse,
    ) -> Result<ApiResponse, ApiError> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return response.error_for_status();
        }

        if envelope.already_retried() {
            debug!(url = %envelope.request().url, "Retried request rejected again");
            return Err(self.terminal_failure(&envelope));
        }
        envelope.mark_retried();

        let Some(access) = self.renew_access(envelope.sent_with()).await else {
            return Err(self.terminal_failure(&envelope));
        };

        envelope.set_bearer(&access);
        debug!(url = %envelope.request().url, "Replaying request with renewed token");
        let retried = self.transport.send(envelope.request()).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %envelope.request().url, "Request rejected after token refresh");
            return Err(self.terminal_failure(&envelope));
        }
        retried.error_for_status()
    }

    /// Obtain an access token newer than `stale`, calling the refresh endpoint
    /// at most once per burst of concurrent failures. `None` means the session
    /// cannot be renewed.
    async fn renew_access(&self, stale: Option<&str>) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;

        let Some(session) = self.store.session() else {
            debug!("No session to refresh");
            return None;
        };

        // Someone renewed (or logged in again) while this request was in flight
        if stale != Some(session.access.as_str()) {
            debug!("Access token already renewed, reusing it");
            return Some(session.access);
        }

        info!("Access token rejected, refreshing");
        match self.request_refresh(&session.refresh).await {
            Ok(tokens) => {
                let rotated = tokens.refresh.is_some();
                let renewed = session.with_tokens(tokens);
                let access = renewed.access.clone();
                self.store.set_session(renewed);
                info!(rotated, "Access token refreshed");
                Some(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                None
            }
        }
    }

    /// Exchange the refresh token for a new access token. Sent straight to the
    /// transport: no stale bearer header and no 401 handling of its own.
    async fn request_refresh(&self, refresh: &str) -> Result<RefreshedTokens, ApiError> {
        let request = ApiRequest::post(self.resolve(REFRESH_PATH)).json(&RefreshRequest { refresh })?;
        let response = self.transport.send(&request).await?.error_for_status()?;

        let tokens: RefreshedTokens = response.json()?;
        if tokens.access.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Refresh response is missing an access token".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// Log out after an unrecoverable 401 and surface it to the caller.
    ///
    /// The redirect fires when this call removed the session, or when the
    /// request never had credentials. A request whose session was already
    /// torn down by a concurrent failure does not redirect a second time.
    fn terminal_failure(&self, envelope: &RequestEnvelope) -> ApiError {
        let removed = self.store.clear_session();
        if removed || envelope.sent_with().is_none() {
            warn!(url = %envelope.request().url, "Not authenticated, redirecting to login");
            self.redirect.redirect_to_login();
        } else {
            debug!(url = %envelope.request().url, "Session already cleared");
        }
        ApiError::Unauthorized
    }

    // ===== JSON helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }
}
