/// SQLite-backed durable store
///
/// One `kv` table with an UPSERT per write. The connection runs in WAL mode
/// with NORMAL synchronous, and every call moves onto the blocking pool so
/// the async runtime never stalls on disk.
use super::{store_err, DurableStore};
use crate::AuthResult;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Default database path.
const DEFAULT_DB_PATH: &str = "/var/lib/pinlock/state.db";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create or open the store database. `None` opens the default path.
    pub fn new(db_path: Option<&Path>) -> AuthResult<Self> {
        let db_path = db_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| store_err("create database directory", e))?;
        }

        let conn =
            Connection::open(&db_path).map_err(|e| store_err("open store database", e))?;
        Self::from_connection(conn, db_path)
    }

    /// In-memory database, for tests and the simulator.
    pub fn in_memory() -> AuthResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| store_err("open in-memory store", e))?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> AuthResult<Self> {
        // WAL survives crashes mid-write; NORMAL keeps writes fast.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| store_err("set WAL mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| store_err("set synchronous mode", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| store_err("create kv schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn run_blocking<T, F>(&self, context: &'static str, op: F) -> AuthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            op(&mut conn).map_err(|e| store_err(context, e))
        })
        .await
        .map_err(|e| store_err(context, e))?
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let key = key.to_string();
        self.run_blocking("read key", move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run_blocking("write key", move |conn| {
            conn.execute(
                r#"
                INSERT INTO kv (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key)
                DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, keys: &[&str]) -> AuthResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.run_blocking("remove keys", move |conn| {
            // One transaction so credential clears are all-or-nothing.
            let tx = conn.transaction()?;
            for key in &keys {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
            tx.commit()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KEY_AUTH_TOKEN, KEY_PIN_ATTEMPTS, KEY_REFRESH_TOKEN};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = SqliteStore::in_memory().unwrap();

        store.set(KEY_PIN_ATTEMPTS, "{\"attempts\":2}").await.unwrap();
        assert_eq!(
            store.get(KEY_PIN_ATTEMPTS).await.unwrap(),
            Some("{\"attempts\":2}".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = SqliteStore::in_memory().unwrap();

        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_remove_batch() {
        let store = SqliteStore::in_memory().unwrap();

        store.set(KEY_AUTH_TOKEN, "tok").await.unwrap();
        store.set(KEY_REFRESH_TOKEN, "ref").await.unwrap();

        store
            .remove(&[KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN, "missing"])
            .await
            .unwrap();

        assert_eq!(store.get(KEY_AUTH_TOKEN).await.unwrap(), None);
        assert_eq!(store.get(KEY_REFRESH_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("state.db");

        {
            let store = SqliteStore::new(Some(&db_path)).unwrap();
            store.set("persisted", "yes").await.unwrap();
        }

        let store = SqliteStore::new(Some(&db_path)).unwrap();
        assert_eq!(
            store.get("persisted").await.unwrap(),
            Some("yes".to_string())
        );
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("state.db");

        let store = SqliteStore::new(Some(&db_path)).unwrap();
        store.set("k", "v").await.unwrap();

        assert!(db_path.exists());
    }
}
