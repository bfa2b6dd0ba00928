//! Session-scoped credential storage.
//!
//! [`SessionStorage`] is the raw key-value backend. Its lifetime must match
//! one browser tab (or one process): when the tab closes, everything in it is
//! gone. Only the session manager writes the credential keys, through the
//! crate-private [`CredentialStore`] adapter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{AccessToken, MfaChallengeToken, RefreshToken};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const MFA_CHALLENGE_TOKEN_KEY: &str = "mfa_challenge_token";

/// Key-value store scoped to a single session lifetime.
///
/// Implementations must not persist beyond the tab/process. A persistent
/// backend (disk, `localStorage`) defeats the credential isolation this crate
/// relies on.
pub trait SessionStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// In-memory storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Typed view over the three credential keys.
pub(crate) struct CredentialStore {
    backend: Arc<dyn SessionStorage>,
}

impl CredentialStore {
    pub(crate) fn new(backend: Arc<dyn SessionStorage>) -> Self {
        Self { backend }
    }

    pub(crate) fn access_token(&self) -> Option<AccessToken> {
        self.read(ACCESS_TOKEN_KEY).map(AccessToken::from)
    }

    pub(crate) fn refresh_token(&self) -> Option<RefreshToken> {
        self.read(REFRESH_TOKEN_KEY).map(RefreshToken::from)
    }

    pub(crate) fn mfa_challenge(&self) -> Option<MfaChallengeToken> {
        self.read(MFA_CHALLENGE_TOKEN_KEY).map(MfaChallengeToken::from)
    }

    /// Store a token pair and drop any pending challenge.
    pub(crate) fn store_tokens(&self, access: &AccessToken, refresh: &RefreshToken) {
        self.backend.remove(MFA_CHALLENGE_TOKEN_KEY);
        self.backend.set(ACCESS_TOKEN_KEY, access.as_str());
        self.backend.set(REFRESH_TOKEN_KEY, refresh.as_str());
    }

    /// Store a challenge token and drop any token pair.
    pub(crate) fn store_challenge(&self, challenge: &MfaChallengeToken) {
        self.clear_tokens();
        self.backend.set(MFA_CHALLENGE_TOKEN_KEY, challenge.as_str());
    }

    pub(crate) fn clear_challenge(&self) {
        self.backend.remove(MFA_CHALLENGE_TOKEN_KEY);
    }

    pub(crate) fn clear_tokens(&self) {
        self.backend.remove(ACCESS_TOKEN_KEY);
        self.backend.remove(REFRESH_TOKEN_KEY);
    }

    pub(crate) fn clear_all(&self) {
        self.clear_tokens();
        self.clear_challenge();
    }

    // Empty strings count as absent.
    fn read(&self, key: &str) -> Option<String> {
        self.backend.get(key).filter(|v| !v.is_empty())
    }
}
