/// Failure handling for the gate and every other backend caller
///
/// Two layers:
/// - Classification: reduce any raw failure to one of ten `ErrorKind`s, each
///   carrying a fixed retry / logout / alert policy (`ErrorInfo`).
/// - Retry: re-run a failing call with bounded exponential backoff, branching
///   on the classification after every attempt.
///
/// ```text
/// ┌──────────────────────────────┐
/// │        RetryScheduler        │
/// │  attempt → classify → wait   │
/// └──────────────┬───────────────┘
///                │
///                ↓
/// ┌──────────────────────────────┐
/// │        ErrorClassifier       │
/// │  AuthError / status / text   │
/// │        → ErrorInfo           │
/// └──────────────────────────────┘
/// ```
///
/// The classifier is pure; all logging lives in the scheduler and its
/// callers.
pub mod classification;
pub mod retry;

// Re-export main types for convenience
pub use classification::{ErrorClassifier, ErrorInfo, ErrorKind};
pub use retry::{delay_cap, RetryContext, RetryScheduler};
