/// Consecutive-failure tracking with durable lockout
///
/// The counter is write-through: every mutation persists before the
/// in-memory record is committed, so a crash between the two can only
/// under-report attempts already punished, never forget a lockout. A store
/// failure fails the mutation and leaves the record untouched.
use crate::store::{store_err, DurableStore, KEY_PIN_ATTEMPTS};
use crate::AuthResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persisted failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Consecutive failed entries, saturating at the lockout threshold.
    pub attempts: u32,

    /// True once `attempts` reached the threshold; cleared only by an
    /// explicit reset or a successful entry.
    pub locked_out: bool,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AttemptRecord {
    fn empty() -> Self {
        Self {
            attempts: 0,
            locked_out: false,
            updated_at: Utc::now(),
        }
    }
}

/// Read-only view handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSnapshot {
    pub attempts: u32,
    pub locked_out: bool,

    /// Entries left before lockout.
    pub remaining: u32,
}

/// Durable counter of consecutive failed PIN entries.
///
/// Mutations are serialized by an async mutex held across the write-through,
/// so two interleaved verifications cannot both observe the pre-increment
/// count.
pub struct AttemptTracker {
    store: Arc<dyn DurableStore>,
    threshold: u32,
    record: Mutex<AttemptRecord>,
}

impl AttemptTracker {
    /// Load the tracker from the store, healing any unreadable or
    /// out-of-range record back into the invariant.
    pub async fn load(store: Arc<dyn DurableStore>, threshold: u32) -> AuthResult<Self> {
        let mut record = match store.get(KEY_PIN_ATTEMPTS).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unreadable attempt record, resetting");
                AttemptRecord::empty()
            }),
            None => AttemptRecord::empty(),
        };

        record.attempts = record.attempts.min(threshold);
        record.locked_out = record.attempts >= threshold;

        Ok(Self {
            store,
            threshold,
            record: Mutex::new(record),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current counter state.
    pub async fn current(&self) -> AttemptSnapshot {
        self.snapshot(&*self.record.lock().await)
    }

    /// Count one failed entry. Engages lockout when the counter reaches the
    /// threshold.
    pub async fn record_failure(&self) -> AuthResult<AttemptSnapshot> {
        let mut record = self.record.lock().await;

        let mut next = record.clone();
        next.attempts = (next.attempts + 1).min(self.threshold);
        next.locked_out = next.attempts >= self.threshold;
        next.updated_at = Utc::now();

        self.persist(&next).await?;

        if next.locked_out && !record.locked_out {
            tracing::warn!(attempts = next.attempts, "PIN entry locked out");
        }

        *record = next;
        Ok(self.snapshot(&record))
    }

    /// Clear the counter after an accepted entry.
    pub async fn record_success(&self) -> AuthResult<()> {
        self.reset().await
    }

    /// Clear the counter and lockout explicitly.
    pub async fn reset(&self) -> AuthResult<()> {
        let mut record = self.record.lock().await;

        let next = AttemptRecord::empty();
        self.persist(&next).await?;

        *record = next;
        Ok(())
    }

    async fn persist(&self, record: &AttemptRecord) -> AuthResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| store_err("serialize attempt record", e))?;
        self.store.set(KEY_PIN_ATTEMPTS, &json).await
    }

    fn snapshot(&self, record: &AttemptRecord) -> AttemptSnapshot {
        AttemptSnapshot {
            attempts: record.attempts,
            locked_out: record.locked_out,
            remaining: self.threshold.saturating_sub(record.attempts),
        }
    }
}
