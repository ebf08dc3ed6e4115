// Allow dead code: not every test binary uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::{json, Value};
use storefront_core::api::{ApiError, ApiRequest, ApiResponse, AuthClient, LoginRedirect, Transport};
use storefront_core::auth::{CredentialStore, Identity, KeyValueStore, MemoryStore, Session, SESSION_KEY};

pub const BASE_URL: &str = "http://shop.test";
pub const REFRESH_PATH: &str = "/api/users/refresh/";
pub const LOGIN_PATH: &str = "/api/users/login/";
pub const REGISTER_PATH: &str = "/api/users/register/";

#[derive(Debug, Default)]
struct Tokens {
    access: String,
    refresh: String,
    issued: usize,
}

/// In-process stand-in for the storefront backend.
///
/// Resources under `/api/public/` are open; everything else requires the
/// currently valid access token. Refresh hands out `A2`, `A3`, ... in order.
#[derive(Debug, Default)]
pub struct FakeBackend {
    tokens: Mutex<Tokens>,
    refresh_fails: AtomicBool,
    rotate_refresh: AtomicBool,
    reject_all: AtomicBool,
    network_down: Mutex<Vec<String>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeBackend {
    pub fn new(access: &str, refresh: &str) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut tokens = backend.tokens.lock().unwrap();
            tokens.access = access.to_string();
            tokens.refresh = refresh.to_string();
            tokens.issued = 1;
        }
        Arc::new(backend)
    }

    /// The access token the client holds is no longer accepted
    pub fn expire_access(&self) {
        self.tokens.lock().unwrap().access.clear();
    }

    pub fn fail_refresh(&self) {
        self.refresh_fails.store(true, Ordering::SeqCst);
    }

    pub fn rotate_refresh(&self) {
        self.rotate_refresh.store(true, Ordering::SeqCst);
    }

    /// Reject every access token, even freshly issued ones
    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    pub fn network_down(&self, path: &str) {
        self.network_down.lock().unwrap().push(path.to_string());
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        let url = format!("{}{}", BASE_URL, path);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.requests_to(REFRESH_PATH).len()
    }

    fn respond(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);

        if self.network_down.lock().unwrap().iter().any(|p| p == path) {
            return Err(ApiError::NetworkError(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))));
        }

        let body = request.body.clone().unwrap_or(Value::Null);
        Ok(match path {
            REFRESH_PATH => self.refresh(&body),
            LOGIN_PATH => self.login(&body),
            REGISTER_PATH => self.register(&body),
            "/api/missing/" => ApiResponse::json_body(
                StatusCode::NOT_FOUND,
                &json!({"detail": "Not found."}),
            ),
            p if p.starts_with("/api/public/") => {
                ApiResponse::json_body(StatusCode::OK, &json!({"path": p}))
            }
            p => self.protected(p, request.bearer_token()),
        })
    }

    fn refresh(&self, body: &Value) -> ApiResponse {
        let mut tokens = self.tokens.lock().unwrap();
        let presented = body["refresh"].as_str().unwrap_or_default();
        if self.refresh_fails.load(Ordering::SeqCst) || presented != tokens.refresh {
            return ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
            );
        }

        tokens.issued += 1;
        tokens.access = format!("A{}", tokens.issued);
        if self.rotate_refresh.load(Ordering::SeqCst) {
            tokens.refresh = format!("R{}", tokens.issued);
            ApiResponse::json_body(
                StatusCode::OK,
                &json!({"access": tokens.access, "refresh": tokens.refresh}),
            )
        } else {
            ApiResponse::json_body(StatusCode::OK, &json!({"access": tokens.access}))
        }
    }

    fn login(&self, body: &Value) -> ApiResponse {
        if body["username"] != "kim@example.com" || body["password"] != "secret" {
            return ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "No active account found with the given credentials"}),
            );
        }
        self.issue_session("Kim", "kim@example.com", StatusCode::OK)
    }

    fn register(&self, body: &Value) -> ApiResponse {
        let name = body["name"].as_str().unwrap_or_default();
        let email = body["email"].as_str().unwrap_or_default();
        if email == "kim@example.com" {
            return ApiResponse::json_body(
                StatusCode::BAD_REQUEST,
                &json!({"detail": "User with this email already exists"}),
            );
        }
        self.issue_session(name, email, StatusCode::CREATED)
    }

    fn issue_session(&self, name: &str, email: &str, status: StatusCode) -> ApiResponse {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.access = "A1".to_string();
        tokens.refresh = "R1".to_string();
        tokens.issued = 1;
        ApiResponse::json_body(
            status,
            &json!({
                "refresh": tokens.refresh,
                "access": tokens.access,
                "id": 7,
                "_id": 7,
                "username": email,
                "email": email,
                "name": name,
                "isAdmin": false
            }),
        )
    }

    fn protected(&self, path: &str, bearer: Option<&str>) -> ApiResponse {
        let tokens = self.tokens.lock().unwrap();
        let accepted = !self.reject_all.load(Ordering::SeqCst)
            && !tokens.access.is_empty()
            && bearer == Some(tokens.access.as_str());
        if accepted {
            ApiResponse::json_body(StatusCode::OK, &json!({"path": path, "token": tokens.access}))
        } else {
            ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
            )
        }
    }
}

impl Transport for FakeBackend {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            // Let other in-flight requests reach the server before answering
            tokio::task::yield_now().await;
            self.respond(request)
        })
    }
}

/// Counts forced logouts.
#[derive(Debug, Default)]
pub struct CountingRedirect {
    count: AtomicUsize,
}

impl CountingRedirect {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Storage handle that outlives the store, so tests can inspect the durable copy
/// and reopen a store over it.
#[derive(Debug, Clone, Default)]
pub struct SharedStorage(pub Arc<MemoryStore>);

impl SharedStorage {
    pub fn persisted(&self) -> Option<Session> {
        let payload = self.0.get(SESSION_KEY).unwrap()?;
        Some(serde_json::from_str(&payload).unwrap())
    }
}

impl KeyValueStore for SharedStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.0.remove(key)
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub redirect: Arc<CountingRedirect>,
    pub storage: SharedStorage,
    pub client: AuthClient,
}

impl Harness {
    /// Client whose durable storage already holds `{access, refresh}` when the
    /// store is opened, as after a restart.
    pub fn logged_in(access: &str, refresh: &str) -> Self {
        let storage = SharedStorage::default();
        let session = Session::new(access, refresh, Identity::default());
        storage
            .set(SESSION_KEY, &serde_json::to_string(&session).unwrap())
            .unwrap();
        Self::build(FakeBackend::new(access, refresh), storage)
    }

    pub fn logged_out() -> Self {
        Self::build(FakeBackend::new("", ""), SharedStorage::default())
    }

    fn build(backend: Arc<FakeBackend>, storage: SharedStorage) -> Self {
        let redirect = Arc::new(CountingRedirect::default());
        let store = Arc::new(CredentialStore::open(Box::new(storage.clone())));
        let client = AuthClient::with_transport(BASE_URL, store, backend.clone(), redirect.clone());
        Self {
            backend,
            redirect,
            storage,
            client,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        self.client.store()
    }
}
