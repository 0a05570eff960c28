//! Per-session API credential storage.

use dashmap::DashMap;

use crate::error::{ServiceError, ServiceResult};

/// An opaque API key supplied by the user for their session.
///
/// The value authorizes calls to the remote model and must never reach
/// durable storage or the log stream in cleartext.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret value. Only the provider factory should read this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Concurrency-safe map of session id -> API key.
///
/// Entries are independent per session; no component other than the
/// provider factory reads the key value, everyone else only checks
/// presence via [`CredentialStore::is_configured`].
#[derive(Default)]
pub struct CredentialStore {
    keys: DashMap<String, ApiKey>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key for `session`, replacing any prior value.
    ///
    /// Blank keys are rejected and leave stored state untouched.
    pub fn set(&self, session: &str, key: &str) -> ServiceResult<()> {
        if key.trim().is_empty() {
            return Err(ServiceError::Validation("API key cannot be empty".into()));
        }
        self.keys.insert(session.to_string(), ApiKey::new(key));
        Ok(())
    }

    /// The key for `session`, if one is configured. Never fails.
    pub fn get(&self, session: &str) -> Option<ApiKey> {
        self.keys.get(session).map(|entry| entry.value().clone())
    }

    /// Whether `session` has a key configured.
    pub fn is_configured(&self, session: &str) -> bool {
        self.keys.contains_key(session)
    }

    /// Remove the key for `session` if present. Idempotent.
    pub fn clear(&self, session: &str) {
        self.keys.remove(session);
    }
}
