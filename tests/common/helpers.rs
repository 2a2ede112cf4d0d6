/// Common test helper functions
use pinlock::store::{SqliteStore, KEY_AUTH_TOKEN, KEY_PIN_ENABLED};
use pinlock::{AuthResult, DurableStore, GateConfig, LockGate, LockState, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Walk a full entry through the gate one digit at a time, returning the
/// state after the last digit.
pub async fn enter(gate: &LockGate, entry: &str) -> AuthResult<LockState> {
    let mut state = gate.state();
    for digit in entry.chars() {
        state = gate.submit_digit(digit).await?;
    }
    Ok(state)
}

/// Open (or create) a SQLite store at `path`, seeded with PIN enabled and a
/// live session token so a fresh gate launches into `AwaitingEntry`.
pub async fn seeded_sqlite(path: &Path) -> AuthResult<Arc<SqliteStore>> {
    let store = Arc::new(SqliteStore::new(Some(path))?);
    store.set(KEY_PIN_ENABLED, "true").await?;
    store.set(KEY_AUTH_TOKEN, "session-token").await?;
    Ok(store)
}

/// Gate configuration with a single verification attempt and a short
/// debounce window, so tests are not dominated by backoff sleeps.
pub fn fast_config() -> GateConfig {
    GateConfig {
        retry: RetryPolicy::new(1, Duration::from_millis(10)),
        debounce_window_ms: 50,
        ..GateConfig::default()
    }
}
