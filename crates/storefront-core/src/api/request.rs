//! Request and response descriptors passed through the authenticated pipeline.

use std::borrow::Cow;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use super::ApiError;

/// An outgoing HTTP call: method, URL, headers and optional JSON body.
///
/// `url` may be absolute or a path (`/api/products/`) that the client
/// resolves against its base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Token carried in the `Authorization: Bearer` header, if any
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// One logical call through the pipeline.
///
/// Created fresh for every call; `already_retried` guards the single
/// refresh-and-retry the pipeline is allowed to perform.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    request: ApiRequest,
    already_retried: bool,
    sent_with: Option<String>,
}

impl RequestEnvelope {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            already_retried: false,
            sent_with: None,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut ApiRequest {
        &mut self.request
    }

    pub fn already_retried(&self) -> bool {
        self.already_retried
    }

    pub fn mark_retried(&mut self) {
        self.already_retried = true;
    }

    /// Access token the request was last authorized with
    pub fn sent_with(&self) -> Option<&str> {
        self.sent_with.as_deref()
    }

    /// Authorize the request with `token`. A token that is not a valid
    /// header value leaves the request unauthenticated.
    pub fn set_bearer(&mut self, token: &str) {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.request.headers.insert(header::AUTHORIZATION, value);
                self.sent_with = Some(token.to_string());
            }
            Err(_) => {
                warn!("Access token is not a valid header value, sending unauthenticated");
                self.clear_bearer();
            }
        }
    }

    pub fn clear_bearer(&mut self) {
        self.request.headers.remove(header::AUTHORIZATION);
        self.sent_with = None;
    }

    pub fn into_request(self) -> ApiRequest {
        self.request
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Convenience constructor for a JSON body
    pub fn json_body(status: StatusCode, body: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, body.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Pass 2xx responses through; map anything else to an [`ApiError`].
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.text()))
        }
    }
}
