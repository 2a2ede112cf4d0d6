/// PIN validators: the backend boundary and the offline fallback
///
/// `PinValidator` is the seam the backend sits behind; the gate never sees a
/// transport. `LocalFallbackValidator` answers from the cached digest of the
/// last backend-accepted PIN, and only when the remote check failed for
/// reachability reasons.
use crate::store::{DurableStore, KEY_PIN_CACHE};
use crate::AuthResult;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Outcome of a PIN check that actually reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Whether the backend accepted the entry.
    pub valid: bool,

    /// Backend-provided detail, shown to the user on rejection.
    pub message: Option<String>,
}

impl VerifyOutcome {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Backend PIN check. `Err` means the check itself failed (transport,
/// server); a reachable backend that rejects the entry returns `Ok` with
/// `valid: false`. The two must never be conflated: only the latter counts
/// as a failed attempt.
#[async_trait]
pub trait PinValidator: Send + Sync {
    async fn verify(&self, user_id: &str, pin: &SecretString) -> AuthResult<VerifyOutcome>;
}

/// SHA-256 hex digest of a PIN, the only form ever persisted or compared
/// locally.
pub fn pin_digest(pin: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.expose_secret().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Offline verdict from the digest cache.
pub struct LocalFallbackValidator {
    store: Arc<dyn DurableStore>,
}

impl LocalFallbackValidator {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Compare an entry against the cached digest. `Ok(None)` means no
    /// digest is cached and the caller must degrade per its offline policy.
    pub async fn verify_cached(&self, pin: &SecretString) -> AuthResult<Option<bool>> {
        match self.store.get(KEY_PIN_CACHE).await? {
            Some(cached) => Ok(Some(cached == pin_digest(pin))),
            None => Ok(None),
        }
    }

    /// Cache the digest of a PIN the backend just accepted.
    pub async fn cache_accepted(&self, pin: &SecretString) -> AuthResult<()> {
        self.store.set(KEY_PIN_CACHE, &pin_digest(pin)).await
    }

    /// Drop the cached digest.
    pub async fn clear(&self) -> AuthResult<()> {
        self.store.remove(&[KEY_PIN_CACHE]).await
    }
}
