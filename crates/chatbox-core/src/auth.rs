//! Credential context shared by the API client and the front end.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::storage::{ACCESS_TOKEN_KEY, ACTIVE_SESSION_KEY, LocalStorage, REFRESH_TOKEN_KEY};

/// Access/refresh token pair issued at login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask))
            .finish()
    }
}

/// Shows only the last four characters of a token
pub fn mask(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("***{tail}")
}

/// Cheap-to-clone handle over the persisted credential state.
///
/// Every mutation is written through to storage; a failed write is logged
/// and the in-memory value still changes.
#[derive(Debug, Clone)]
pub struct AuthContext {
    storage: Arc<Mutex<LocalStorage>>,
}

impl AuthContext {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(LocalStorage::in_memory())
    }

    fn lock(&self) -> MutexGuard<'_, LocalStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut LocalStorage)) {
        let mut storage = self.lock();
        f(&mut storage);
        if let Err(e) = storage.save() {
            tracing::warn!(error = %e, "Failed to persist local storage");
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let storage = self.lock();
        storage.access_token().map(|access| Credentials {
            access_token: access.to_string(),
            refresh_token: storage.refresh_token().map(str::to_string),
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token().map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().access_token().is_some()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        self.update(|storage| {
            storage.set(ACCESS_TOKEN_KEY, credentials.access_token);
            match credentials.refresh_token {
                Some(refresh) => storage.set(REFRESH_TOKEN_KEY, refresh),
                None => {
                    storage.remove(REFRESH_TOKEN_KEY);
                }
            }
        });
    }

    /// Sets or clears the bearer credential attached to subsequent requests
    pub fn set_access_token(&self, token: Option<String>) {
        self.update(|storage| match token {
            Some(token) => storage.set(ACCESS_TOKEN_KEY, token),
            None => {
                storage.remove(ACCESS_TOKEN_KEY);
            }
        });
    }

    pub fn set_refresh_token(&self, token: String) {
        self.update(|storage| storage.set(REFRESH_TOKEN_KEY, token));
    }

    /// Discards both tokens
    pub fn clear(&self) {
        self.update(|storage| {
            storage.remove(ACCESS_TOKEN_KEY);
            storage.remove(REFRESH_TOKEN_KEY);
        });
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.lock().active_session_id().map(str::to_string)
    }

    pub fn set_active_session_id(&self, id: Option<&str>) {
        if self.lock().active_session_id() == id {
            return;
        }
        self.update(|storage| match id {
            Some(id) => storage.set(ACTIVE_SESSION_KEY, id),
            None => {
                storage.remove(ACTIVE_SESSION_KEY);
            }
        });
    }
}
