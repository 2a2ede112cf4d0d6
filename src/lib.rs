pub mod error;
pub mod gate;
pub mod net;
pub mod session;
pub mod store;

// Re-export the main engine surface for convenience
pub use error::{ErrorClassifier, ErrorInfo, ErrorKind};
pub use gate::{GateEvent, LockGate, LockState};
pub use session::{CallScope, HostEvent, SessionController, SessionEvent};
pub use store::DurableStore;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Required PIN length in digits.
pub const PIN_LENGTH: usize = 6;

/// Consecutive failed attempts before the gate locks out.
pub const LOCKOUT_THRESHOLD: u32 = 5;

/// Backoff delay cap for retryable failures other than rate limiting.
pub const STANDARD_DELAY_CAP: Duration = Duration::from_secs(10);

/// Backoff delay cap while the backend is rate limiting.
pub const RATE_LIMIT_DELAY_CAP: Duration = Duration::from_secs(30);

// Typed failure surface for the whole engine. Transport and storage failures
// are wrapped into this enum at the boundary so the classifier always has
// structure to work with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("backend returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("durable store failure: {0}")]
    Store(String),

    #[error("PIN entry is locked out")]
    LockedOut,

    #[error("PIN is not enabled for this account")]
    PinNotEnabled,

    #[error("a verification is already in flight")]
    VerificationInProgress,

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Retry behavior for one logical backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, counting the first try.
    pub max_attempts: u32,

    /// Delay before the first retry, doubled per subsequent attempt (ms).
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// What the gate does when neither remote nor cached verification is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfflinePolicy {
    /// Unlock rather than trap the user behind an unreachable backend.
    FailOpen,

    /// Stay locked until connectivity returns.
    FailClosed,
}

// Gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub pin_length: usize,
    pub lockout_threshold: u32,
    pub retry: RetryPolicy,
    pub offline_policy: OfflinePolicy,

    /// Background dwell shorter than this window skips re-gating on
    /// foreground (ms). Zero re-gates on every foreground transition.
    pub debounce_window_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            pin_length: PIN_LENGTH,
            lockout_threshold: LOCKOUT_THRESHOLD,
            retry: RetryPolicy::default(),
            offline_policy: OfflinePolicy::FailOpen,
            debounce_window_ms: 0,
        }
    }
}

impl GateConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

#[cfg(test)]
mod lib_tests;
