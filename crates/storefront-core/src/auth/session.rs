use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logged-in user session as returned by the login and register endpoints.
///
/// The wire shape is flat: the two tokens sit next to the profile fields
/// (`{"access": .., "refresh": .., "name": .., "isAdmin": ..}`), and the same
/// shape is what gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub refresh: String,
    /// When the access token was issued or last renewed
    #[serde(rename = "refreshedAt", default = "Utc::now")]
    pub refreshed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub identity: Identity,
}

impl Session {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>, identity: Identity) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
            refreshed_at: Utc::now(),
            identity,
        }
    }

    /// A session missing either token is partial and counts as logged out.
    pub fn is_complete(&self) -> bool {
        !self.access.is_empty() && !self.refresh.is_empty()
    }

    /// Copy of this session carrying renewed tokens. The refresh token is only
    /// replaced when the server rotated it.
    pub fn with_tokens(&self, tokens: RefreshedTokens) -> Self {
        Self {
            access: tokens.access,
            refresh: tokens
                .refresh
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| self.refresh.clone()),
            refreshed_at: Utc::now(),
            identity: self.identity.clone(),
        }
    }

    /// Minutes since the access token was issued (for display)
    pub fn token_age_minutes(&self) -> i64 {
        (Utc::now() - self.refreshed_at).num_minutes().max(0)
    }
}

/// Opaque user profile carried alongside the tokens.
///
/// Kept as raw JSON so that whatever the backend adds to its user serializer
/// survives a persist/restore cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Map<String, Value>);

impl Identity {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Display name; the backend falls back to the email when no name is set
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field("email")
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field("username")
    }

    pub fn user_id(&self) -> Option<i64> {
        self.get("id")
            .or_else(|| self.get("_id"))
            .and_then(Value::as_i64)
    }

    pub fn is_admin(&self) -> bool {
        self.get("isAdmin").and_then(Value::as_bool).unwrap_or(false)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// Body returned by the token refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}
