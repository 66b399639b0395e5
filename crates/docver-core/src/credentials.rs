//! Bearer credential sources.
//!
//! The request client asks its provider for a token on every request and
//! never caches the answer, so a login or logout elsewhere in the process is
//! picked up by the very next call.

use std::sync::RwLock;

/// Supplies the current bearer token, if any.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Process-wide session state: set at login, cleared at logout.
#[derive(Debug, Default)]
pub struct SessionStore {
    token: RwLock<Option<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing token (e.g. from the environment).
    ///
    /// Empty tokens are treated as absent.
    pub fn with_token(token: Option<String>) -> Self {
        let store = Self::new();
        if let Some(token) = token {
            store.login(token);
        }
        store
    }

    pub fn login(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = if token.is_empty() { None } else { Some(token) };
        tracing::debug!("Session token {}", if slot.is_some() { "set" } else { "cleared" });
    }

    pub fn logout(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::debug!("Session token cleared");
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl CredentialProvider for SessionStore {
    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Never supplies a token; every request goes out anonymously.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn token(&self) -> Option<String> {
        None
    }
}
