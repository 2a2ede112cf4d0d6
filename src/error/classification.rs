/// Failure classification for retry, alert, and logout decisions
///
/// Every backend failure is reduced to one of ten kinds. Each kind carries a
/// fixed policy triple (retry / logout / alert) so call sites never make
/// per-error decisions: they classify once and follow the policy.
use crate::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy of backend failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport never reached the backend (DNS, socket, offline).
    Network,

    /// The backend rejected the caller's credentials (401).
    Authentication,

    /// The request itself was malformed or rejected (400, 422).
    Validation,

    /// The backend failed internally (5xx).
    Server,

    /// The caller is authenticated but not allowed (403).
    Permission,

    /// The addressed resource does not exist (404).
    NotFound,

    /// The call exceeded its deadline (408, transport timeout).
    Timeout,

    /// The backend is shedding load (429).
    RateLimit,

    /// The request conflicts with current server state (409).
    Conflict,

    /// Anything that matched no other kind.
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth retrying automatically.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Server
                | ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::Unknown
        )
    }

    /// Whether a failure of this kind invalidates the local session.
    pub fn should_logout(&self) -> bool {
        matches!(self, ErrorKind::Authentication)
    }

    /// Whether the user should be told about this failure. Every kind alerts;
    /// the method exists so the policy stays in one place if that changes.
    pub fn should_alert(&self) -> bool {
        true
    }

    /// Default user-facing message for this kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Connection problem. Check your network and try again.",
            ErrorKind::Authentication => "Your session has expired. Please sign in again.",
            ErrorKind::Validation => "The request was rejected as invalid.",
            ErrorKind::Server => "The server hit a problem. Please try again shortly.",
            ErrorKind::Permission => "You don't have permission to do that.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Timeout => "The request took too long. Please try again.",
            ErrorKind::RateLimit => "Too many requests. Please wait a moment.",
            ErrorKind::Conflict => "The request conflicts with the current state.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "Network"),
            ErrorKind::Authentication => write!(f, "Authentication"),
            ErrorKind::Validation => write!(f, "Validation"),
            ErrorKind::Server => write!(f, "Server"),
            ErrorKind::Permission => write!(f, "Permission"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::RateLimit => write!(f, "RateLimit"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Classification result: the kind plus its resolved policy and a message
/// safe to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Which kind the raw failure maps to.
    pub kind: ErrorKind,

    /// Kind's default message, suffixed with the raw detail when present.
    pub user_message: String,

    /// Resolved retry policy for this failure.
    pub should_retry: bool,

    /// Resolved logout policy for this failure.
    pub should_logout: bool,

    /// Resolved alert policy for this failure.
    pub should_alert: bool,
}

impl ErrorInfo {
    /// Build an info record for a kind, carrying the raw detail through.
    pub fn of_kind(kind: ErrorKind, detail: &str) -> Self {
        let user_message = if detail.is_empty() {
            kind.default_message().to_string()
        } else {
            format!("{} ({})", kind.default_message(), detail)
        };

        Self {
            kind,
            user_message,
            should_retry: kind.should_retry(),
            should_logout: kind.should_logout(),
            should_alert: kind.should_alert(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.user_message)
    }
}

// Keyword tables for free-form message classification. Checked in declaration
// order; earlier kinds win, so more specific wording sits above generic.
const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "unreachable",
    "offline",
    "dns",
    "socket",
];

const AUTHENTICATION_KEYWORDS: &[&str] = &[
    "unauthorized",
    "401",
    "token expired",
    "invalid token",
    "session expired",
    "authentication",
];

const VALIDATION_KEYWORDS: &[&str] =
    &["validation", "invalid input", "malformed", "unprocessable", "422", "400"];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "deadline"];

const RATE_LIMIT_KEYWORDS: &[&str] = &["too many requests", "rate limit", "429"];

const SERVER_KEYWORDS: &[&str] = &[
    "internal server",
    "server error",
    "500",
    "502",
    "503",
    "bad gateway",
    "unavailable",
];

const CONFLICT_KEYWORDS: &[&str] = &["conflict", "409", "already exists"];

/// Maps raw failures to `ErrorInfo`. Pure and total: never panics, never
/// logs, never mutates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a typed failure.
    pub fn classify(&self, error: &AuthError) -> ErrorInfo {
        match error {
            AuthError::Network(msg) => ErrorInfo::of_kind(ErrorKind::Network, msg),
            AuthError::Timeout(msg) => ErrorInfo::of_kind(ErrorKind::Timeout, msg),
            AuthError::Status { code, message } => self.classify_status(*code, message),

            // Local failures still classify so callers have one code path.
            AuthError::Store(msg) => ErrorInfo::of_kind(ErrorKind::Unknown, msg),
            AuthError::LockedOut => ErrorInfo::of_kind(ErrorKind::Permission, &error.to_string()),
            AuthError::PinNotEnabled => {
                ErrorInfo::of_kind(ErrorKind::Validation, &error.to_string())
            }
            AuthError::VerificationInProgress => {
                ErrorInfo::of_kind(ErrorKind::Conflict, &error.to_string())
            }
            AuthError::InvalidEntry(msg) => ErrorInfo::of_kind(ErrorKind::Validation, msg),
            AuthError::Unexpected(msg) => self.classify_message(msg),
        }
    }

    /// Classify an HTTP status with its response message.
    pub fn classify_status(&self, code: u16, message: &str) -> ErrorInfo {
        let detail = if message.is_empty() {
            format!("status {}", code)
        } else {
            format!("status {}: {}", code, message)
        };

        let kind = match code {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Permission,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimit,
            500..=599 => ErrorKind::Server,
            // Unmapped codes fall back to the message keywords.
            _ => return self.classify_message(&detail),
        };

        ErrorInfo::of_kind(kind, &detail)
    }

    /// Classify a free-form failure message by keyword, in fixed precedence
    /// order. Unmatched messages land in `Unknown`.
    pub fn classify_message(&self, message: &str) -> ErrorInfo {
        let lower = message.to_lowercase();

        let tables: &[(ErrorKind, &[&str])] = &[
            (ErrorKind::Network, NETWORK_KEYWORDS),
            (ErrorKind::Authentication, AUTHENTICATION_KEYWORDS),
            (ErrorKind::Validation, VALIDATION_KEYWORDS),
            (ErrorKind::Timeout, TIMEOUT_KEYWORDS),
            (ErrorKind::RateLimit, RATE_LIMIT_KEYWORDS),
            (ErrorKind::Server, SERVER_KEYWORDS),
            (ErrorKind::Conflict, CONFLICT_KEYWORDS),
        ];

        for (kind, keywords) in tables {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return ErrorInfo::of_kind(*kind, message);
            }
        }

        ErrorInfo::of_kind(ErrorKind::Unknown, message)
    }
}
