use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::Session;
use super::storage::KeyValueStore;

/// Key the serialized session is persisted under
pub const SESSION_KEY: &str = "userInfo";

/// Sole owner of the current [`Session`].
///
/// The in-memory copy lives in a watch channel so that other parts of the
/// client can observe login/logout; the durable copy is only read once, when
/// the store is opened. Every mutation goes through here so the two copies
/// never drift apart.
pub struct CredentialStore {
    storage: Box<dyn KeyValueStore>,
    state: watch::Sender<Option<Session>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Open the store, restoring whatever session a previous process persisted.
    ///
    /// Unreadable, corrupt or partial payloads open as logged out.
    pub fn open(storage: Box<dyn KeyValueStore>) -> Self {
        let restored = Self::restore(storage.as_ref());
        debug!(restored = restored.is_some(), "Credential store opened");
        let (state, _) = watch::channel(restored);
        Self {
            storage,
            state,
            write_lock: Mutex::new(()),
        }
    }

    fn restore(storage: &dyn KeyValueStore) -> Option<Session> {
        let payload = match storage.get(SESSION_KEY) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&payload) {
            Ok(session) if session.is_complete() => Some(session),
            Ok(_) => {
                warn!("Persisted session is missing a token, ignoring");
                None
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is corrupt, ignoring");
                None
            }
        }
    }

    /// Current session, if logged in
    pub fn session(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    /// Bearer token of the current session
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.access.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Replace the session in memory and on disk, then notify observers.
    ///
    /// A partial session is treated as a logout.
    pub fn set_session(&self, session: Session) {
        if !session.is_complete() {
            warn!("Refusing to store a partial session, clearing instead");
            self.clear_session();
            return;
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let payload = serde_json::to_string(&session);
        self.state.send_replace(Some(session));

        match payload {
            Ok(payload) => {
                if let Err(e) = self.storage.set(SESSION_KEY, &payload) {
                    warn!(error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }
        debug!("Session stored");
    }

    /// Remove the session from memory and disk. Returns whether one was present.
    pub fn clear_session(&self) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.state.send_replace(None);
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to remove persisted session");
        }

        let removed = previous.is_some();
        if removed {
            info!("Session cleared");
        }
        removed
    }

    /// Observe session changes; `None` means logged out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }
}
