/// Durable key/value persistence boundary
///
/// The gate persists small string records (attempt counter, PIN flags,
/// session tokens) through the `DurableStore` trait. The host decides the
/// backing: `SqliteStore` for real deployments, `MemoryStore` for ephemeral
/// runs and tests. Consumers hold an `Arc<dyn DurableStore>` and never see
/// the backing.
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Whether PIN re-authentication is enabled ("true"/"false").
pub const KEY_PIN_ENABLED: &str = "pin.enabled";

/// Serialized consecutive-failure record.
pub const KEY_PIN_ATTEMPTS: &str = "pin.attempts";

/// SHA-256 hex digest of the last PIN the backend accepted.
pub const KEY_PIN_CACHE: &str = "pin.cache";

/// Session access token.
pub const KEY_AUTH_TOKEN: &str = "auth.token";

/// Session refresh token.
pub const KEY_REFRESH_TOKEN: &str = "auth.refresh_token";

/// String key/value store with durable semantics: a returned `set` means the
/// value survives process death.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a value. `None` when the key was never written or was removed.
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    /// Write a value through to durable storage before returning.
    async fn set(&self, key: &str, value: &str) -> AuthResult<()>;

    /// Remove a batch of keys atomically. Missing keys are not an error.
    async fn remove(&self, keys: &[&str]) -> AuthResult<()>;
}

/// In-memory implementation for ephemeral runs and tests. Durable only for
/// the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> AuthResult<()> {
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

// Store failures all funnel into AuthError::Store so write-through callers
// have one variant to branch on.
pub(crate) fn store_err(context: &str, err: impl std::fmt::Display) -> AuthError {
    AuthError::Store(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        assert_eq!(store.get(KEY_PIN_ENABLED).await.unwrap(), None);

        store.set(KEY_PIN_ENABLED, "true").await.unwrap();
        assert_eq!(
            store.get(KEY_PIN_ENABLED).await.unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn test_memory_store_overwrite() {
        let store = MemoryStore::new();

        store.set("k", "first").await.unwrap();
        store.set("k", "second").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("second".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_remove_batch() {
        let store = MemoryStore::new();

        store.set(KEY_AUTH_TOKEN, "tok").await.unwrap();
        store.set(KEY_REFRESH_TOKEN, "ref").await.unwrap();
        store.set(KEY_PIN_ENABLED, "true").await.unwrap();

        store
            .remove(&[KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN])
            .await
            .unwrap();

        assert_eq!(store.get(KEY_AUTH_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(KEY_REFRESH_TOKEN).await.unwrap(), None);
        assert!(store.get(KEY_PIN_ENABLED).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove(&["never.written"]).await.is_ok());
    }
}
