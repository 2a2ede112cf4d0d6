// Tests for crate-level types: AuthError, RetryPolicy, GateConfig defaults,
// and the fixed gate constants.

use super::*;

// ==================== AUTH ERROR TESTS ====================

#[test]
fn test_auth_error_network_display() {
    let err = AuthError::Network("connection refused".to_string());
    assert!(err.to_string().contains("network error"));
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn test_auth_error_timeout_display() {
    let err = AuthError::Timeout("deadline exceeded".to_string());
    assert!(err.to_string().contains("timed out"));
}

#[test]
fn test_auth_error_status_display() {
    let err = AuthError::Status {
        code: 429,
        message: "slow down".to_string(),
    };
    assert!(err.to_string().contains("429"));
    assert!(err.to_string().contains("slow down"));
}

#[test]
fn test_auth_error_locked_out_display() {
    let err = AuthError::LockedOut;
    assert!(err.to_string().contains("locked out"));
}

#[test]
fn test_auth_error_clone_all_variants() {
    let errors = vec![
        AuthError::Network("test".to_string()),
        AuthError::Timeout("test".to_string()),
        AuthError::Status {
            code: 500,
            message: "test".to_string(),
        },
        AuthError::Store("test".to_string()),
        AuthError::LockedOut,
        AuthError::PinNotEnabled,
        AuthError::VerificationInProgress,
        AuthError::InvalidEntry("test".to_string()),
        AuthError::Unexpected("test".to_string()),
    ];

    for err in errors {
        let cloned = err.clone();
        assert_eq!(cloned, err);
    }
}

// ==================== RETRY POLICY TESTS ====================

#[test]
fn test_retry_policy_default() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay_ms, 500);
    assert_eq!(policy.base_delay(), Duration::from_millis(500));
}

#[test]
fn test_retry_policy_new_from_duration() {
    let policy = RetryPolicy::new(5, Duration::from_secs(2));

    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay_ms, 2000);
}

#[test]
fn test_retry_policy_serde_round_trip() {
    let policy = RetryPolicy::new(4, Duration::from_millis(250));
    let json = serde_json::to_string(&policy).unwrap();
    let back: RetryPolicy = serde_json::from_str(&json).unwrap();

    assert_eq!(back.max_attempts, 4);
    assert_eq!(back.base_delay_ms, 250);
}

// ==================== GATE CONFIG TESTS ====================

#[test]
fn test_gate_config_default() {
    let config = GateConfig::default();

    assert_eq!(config.pin_length, PIN_LENGTH);
    assert_eq!(config.lockout_threshold, LOCKOUT_THRESHOLD);
    assert_eq!(config.offline_policy, OfflinePolicy::FailOpen);
    assert_eq!(config.debounce_window(), Duration::ZERO);
}

#[test]
fn test_gate_config_debounce_window() {
    let config = GateConfig {
        debounce_window_ms: 1500,
        ..GateConfig::default()
    };

    assert_eq!(config.debounce_window(), Duration::from_millis(1500));
}

// ==================== CONSTANT TESTS ====================

#[test]
fn test_gate_constants() {
    assert_eq!(PIN_LENGTH, 6);
    assert_eq!(LOCKOUT_THRESHOLD, 5);
    assert_eq!(STANDARD_DELAY_CAP, Duration::from_secs(10));
    assert_eq!(RATE_LIMIT_DELAY_CAP, Duration::from_secs(30));
    assert!(STANDARD_DELAY_CAP < RATE_LIMIT_DELAY_CAP);
}
