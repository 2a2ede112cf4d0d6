#![allow(dead_code)]
/// Mock backend validator for integration tests
///
/// Accepts exactly one PIN and can be pushed offline (every call fails with
/// a network error) or told to fail the next N calls before answering, for
/// exercising retry and fallback paths. Call counts are tracked so tests can
/// assert how many times the backend was actually reached.
use async_trait::async_trait;
use pinlock::gate::validator::{PinValidator, VerifyOutcome};
use pinlock::{AuthError, AuthResult};
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockBackend {
    accepted_pin: Mutex<String>,
    offline: AtomicBool,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn accepting(pin: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted_pin: Mutex::new(pin.to_string()),
            offline: AtomicBool::new(false),
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        })
    }

    /// Every subsequent call fails with a network error.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn come_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Fail the next `count` calls with a network error, then answer again.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PinValidator for MockBackend {
    async fn verify(&self, _user_id: &str, pin: &SecretString) -> AuthResult<VerifyOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::Network("backend unreachable".to_string()));
        }
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(AuthError::Network("transient connection loss".to_string()));
        }

        Ok(
            if pin.expose_secret() == self.accepted_pin.lock().unwrap().as_str() {
                VerifyOutcome::accepted()
            } else {
                VerifyOutcome::rejected("wrong PIN")
            },
        )
    }
}
