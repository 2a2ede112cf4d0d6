/// The lock gate state machine
///
/// Decides whether the lock screen must show, accepts digit entry, runs
/// verification through the retry scheduler, and drives the attempt tracker.
/// State lives behind one mutex with short critical sections; the mutex is
/// never held across an await. While a verification is in flight the gate
/// reports `Verifying` and rejects further input, so one entry can never
/// produce two backend calls.
use super::attempts::AttemptTracker;
use super::validator::{LocalFallbackValidator, PinValidator};
use crate::error::{ErrorClassifier, ErrorInfo, ErrorKind, RetryScheduler};
use crate::store::{DurableStore, KEY_AUTH_TOKEN, KEY_PIN_CACHE, KEY_PIN_ENABLED, KEY_REFRESH_TOKEN};
use crate::{AuthError, AuthResult, GateConfig, OfflinePolicy};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Gate position. `Verifying` doubles as the re-entrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No lock screen; the session is usable.
    Unlocked,

    /// Lock screen showing, accumulating digits.
    AwaitingEntry,

    /// A completed entry is being checked; input is rejected.
    Verifying,

    /// Too many consecutive failures; only reset or logout leave this state.
    LockedOut,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unlocked => write!(f, "Unlocked"),
            LockState::AwaitingEntry => write!(f, "AwaitingEntry"),
            LockState::Verifying => write!(f, "Verifying"),
            LockState::LockedOut => write!(f, "LockedOut"),
        }
    }
}

/// Host-facing notifications, the channel rendition of unlock/lockout
/// callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    /// Entry accepted; dismiss the lock screen.
    Unlocked,

    /// Lockout engaged; offer reset or logout.
    LockedOut,

    /// Entry rejected and cleared; show remaining attempts.
    EntryCleared { attempts_remaining: u32 },

    /// Verification could not complete; show the classified message.
    VerificationError { info: ErrorInfo },
}

/// Durable gate state as a read-only snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PinState {
    pub enabled: bool,

    /// SHA-256 hex digest of the last backend-accepted PIN, if cached.
    pub pin_cache: Option<String>,

    pub attempts: u32,
    pub locked_out: bool,
}

struct GateInner {
    state: LockState,
    entry: String,
    enabled: bool,
    /// Mirror of the tracker's persisted lockout, so the synchronous
    /// `activate` can route to `LockedOut` without touching the store.
    locked_out: bool,
    user_id: String,
}

pub struct LockGate {
    config: GateConfig,
    store: Arc<dyn DurableStore>,
    remote: Arc<dyn PinValidator>,
    fallback: LocalFallbackValidator,
    tracker: AttemptTracker,
    scheduler: RetryScheduler,
    classifier: ErrorClassifier,
    inner: Mutex<GateInner>,
    subscribers: Mutex<Vec<UnboundedSender<GateEvent>>>,
}

impl LockGate {
    /// Build a gate from persisted state, starting `Unlocked`. A persisted
    /// lockout stays in force: the next [`LockGate::activate`] lands on
    /// `LockedOut`, not fresh entry. Use [`LockGate::new_at_launch`] when
    /// the process is starting fresh and the initial position must be
    /// decided from the session.
    pub async fn new(
        config: GateConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn PinValidator>,
        user_id: impl Into<String>,
    ) -> AuthResult<Self> {
        let enabled = matches!(
            store.get(KEY_PIN_ENABLED).await?.as_deref(),
            Some("true")
        );
        let tracker = AttemptTracker::load(store.clone(), config.lockout_threshold).await?;
        let locked_out = tracker.current().await.locked_out;
        let fallback = LocalFallbackValidator::new(store.clone());
        let scheduler = RetryScheduler::new(config.retry.clone());

        Ok(Self {
            config,
            store,
            remote,
            fallback,
            tracker,
            scheduler,
            classifier: ErrorClassifier::new(),
            inner: Mutex::new(GateInner {
                state: LockState::Unlocked,
                entry: String::new(),
                enabled,
                locked_out,
                user_id: user_id.into(),
            }),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Build a gate at process launch. Starts `Unlocked` when the PIN is
    /// disabled or no session exists, `LockedOut` when a lockout was
    /// persisted, otherwise `AwaitingEntry`.
    pub async fn new_at_launch(
        config: GateConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn PinValidator>,
        user_id: impl Into<String>,
    ) -> AuthResult<Self> {
        let gate = Self::new(config, store, remote, user_id).await?;

        let has_session = gate.store.get(KEY_AUTH_TOKEN).await?.is_some();

        let initial = {
            let mut inner = gate.inner.lock().unwrap();
            inner.state = if !inner.enabled || !has_session {
                LockState::Unlocked
            } else if inner.locked_out {
                LockState::LockedOut
            } else {
                LockState::AwaitingEntry
            };
            inner.state
        };

        tracing::info!(state = %initial, enabled = gate.pin_enabled(), "gate initialized");
        Ok(gate)
    }

    /// Receive gate notifications. Each call gets its own stream.
    pub fn subscribe(&self) -> UnboundedReceiver<GateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn state(&self) -> LockState {
        self.inner.lock().unwrap().state
    }

    /// Whether the lock screen must be showing right now.
    pub fn is_locked(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.enabled && inner.state != LockState::Unlocked
    }

    pub fn pin_enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    /// Digits accumulated so far.
    pub fn entered_len(&self) -> usize {
        self.inner.lock().unwrap().entry.len()
    }

    /// Demand re-authentication (foreground transition). No-op when the PIN
    /// is disabled, a lockout is standing, or a verification is in flight.
    pub fn activate(&self) -> LockState {
        let mut inner = self.inner.lock().unwrap();

        if !inner.enabled {
            return inner.state;
        }

        match inner.state {
            LockState::Unlocked | LockState::AwaitingEntry => {
                inner.entry.clear();
                // A lockout persisted before this gate was built still
                // stands; re-authentication lands on it, not on entry.
                inner.state = if inner.locked_out {
                    LockState::LockedOut
                } else {
                    LockState::AwaitingEntry
                };
            }
            // An in-flight verification finishes on its own; a lockout
            // stands until reset.
            LockState::Verifying | LockState::LockedOut => {}
        }

        inner.state
    }

    /// Append one digit. The sixth digit completes the entry and runs
    /// verification before returning; the returned state is final for this
    /// entry.
    pub async fn submit_digit(&self, digit: char) -> AuthResult<LockState> {
        let completed = {
            let mut inner = self.inner.lock().unwrap();

            if !inner.enabled {
                return Err(AuthError::PinNotEnabled);
            }
            match inner.state {
                LockState::LockedOut => return Err(AuthError::LockedOut),
                LockState::Verifying => return Err(AuthError::VerificationInProgress),
                LockState::Unlocked => {
                    return Err(AuthError::InvalidEntry(
                        "no re-authentication in progress".to_string(),
                    ));
                }
                LockState::AwaitingEntry => {}
            }
            if !digit.is_ascii_digit() {
                return Err(AuthError::InvalidEntry(format!(
                    "{:?} is not a digit",
                    digit
                )));
            }

            inner.entry.push(digit);
            if inner.entry.len() < self.config.pin_length {
                return Ok(LockState::AwaitingEntry);
            }

            // Entry complete: move to Verifying before releasing the lock so
            // concurrent submitters are rejected.
            inner.state = LockState::Verifying;
            std::mem::take(&mut inner.entry)
        };

        self.verify_entry(SecretString::from(completed)).await
    }

    /// Remove the most recent digit. Accepted only while awaiting entry.
    pub fn delete_digit(&self) -> AuthResult<usize> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            LockState::AwaitingEntry => {
                inner.entry.pop();
                Ok(inner.entry.len())
            }
            LockState::Verifying => Err(AuthError::VerificationInProgress),
            LockState::LockedOut => Err(AuthError::LockedOut),
            LockState::Unlocked => Ok(0),
        }
    }

    /// Clear the attempt counter and, when locked out, return to entry.
    pub async fn reset_attempts(&self) -> AuthResult<LockState> {
        self.tracker.reset().await?;

        let mut inner = self.inner.lock().unwrap();
        inner.locked_out = false;
        if inner.state == LockState::LockedOut {
            inner.entry.clear();
            inner.state = LockState::AwaitingEntry;
        }
        tracing::info!(state = %inner.state, "attempt counter reset");
        Ok(inner.state)
    }

    /// Turn the PIN on after the backend accepted `pin`. Caches the digest
    /// for offline verification and clears any stale attempts.
    pub async fn enable_pin(&self, pin: &SecretString) -> AuthResult<()> {
        self.validate_pin_format(pin)?;

        self.store.set(KEY_PIN_ENABLED, "true").await?;
        self.fallback.cache_accepted(pin).await?;
        self.tracker.reset().await?;

        let mut inner = self.inner.lock().unwrap();
        inner.enabled = true;
        inner.locked_out = false;
        tracing::info!("PIN enabled");
        Ok(())
    }

    /// Turn the PIN off and drop the digest cache and attempt record.
    pub async fn disable_pin(&self) -> AuthResult<()> {
        self.store.set(KEY_PIN_ENABLED, "false").await?;
        self.tracker.reset().await?;
        self.fallback.clear().await?;

        let mut inner = self.inner.lock().unwrap();
        inner.enabled = false;
        inner.locked_out = false;
        inner.entry.clear();
        inner.state = LockState::Unlocked;
        tracing::info!("PIN disabled");
        Ok(())
    }

    /// Replace the cached digest after the backend accepted a PIN change.
    pub async fn change_pin(&self, new_pin: &SecretString) -> AuthResult<()> {
        self.validate_pin_format(new_pin)?;

        if !self.pin_enabled() {
            return Err(AuthError::PinNotEnabled);
        }
        self.fallback.cache_accepted(new_pin).await?;
        self.tracker.reset().await?;

        self.inner.lock().unwrap().locked_out = false;
        tracing::info!("PIN changed, digest cache refreshed");
        Ok(())
    }

    /// Re-read the persisted enabled flag, for hosts that mutate the store
    /// out of band (settings sync).
    pub async fn load_from_store(&self) -> AuthResult<bool> {
        let enabled = matches!(
            self.store.get(KEY_PIN_ENABLED).await?.as_deref(),
            Some("true")
        );
        self.inner.lock().unwrap().enabled = enabled;
        Ok(enabled)
    }

    /// Overwrite local gate settings with the backend's account record.
    pub async fn mirror_from_backend(
        &self,
        enabled: bool,
        digest: Option<&str>,
    ) -> AuthResult<()> {
        self.store
            .set(KEY_PIN_ENABLED, if enabled { "true" } else { "false" })
            .await?;
        if let Some(digest) = digest {
            self.store.set(KEY_PIN_CACHE, digest).await?;
        }

        self.inner.lock().unwrap().enabled = enabled;
        tracing::debug!(enabled, "gate settings mirrored from backend");
        Ok(())
    }

    /// Remove every persisted gate and session record (account deletion,
    /// full local wipe).
    pub async fn wipe_local_data(&self) -> AuthResult<()> {
        self.tracker.reset().await?;
        self.store
            .remove(&[
                KEY_PIN_ENABLED,
                KEY_PIN_CACHE,
                KEY_AUTH_TOKEN,
                KEY_REFRESH_TOKEN,
            ])
            .await?;

        let mut inner = self.inner.lock().unwrap();
        inner.enabled = false;
        inner.locked_out = false;
        inner.entry.clear();
        inner.state = LockState::Unlocked;
        tracing::info!("local gate data wiped");
        Ok(())
    }

    /// Durable state snapshot.
    pub async fn pin_state(&self) -> AuthResult<PinState> {
        let snapshot = self.tracker.current().await;
        Ok(PinState {
            enabled: self.pin_enabled(),
            pin_cache: self.store.get(KEY_PIN_CACHE).await?,
            attempts: snapshot.attempts,
            locked_out: snapshot.locked_out,
        })
    }

    fn validate_pin_format(&self, pin: &SecretString) -> AuthResult<()> {
        let raw = pin.expose_secret();
        if raw.len() != self.config.pin_length || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidEntry(format!(
                "PIN must be exactly {} digits",
                self.config.pin_length
            )));
        }
        Ok(())
    }

    fn emit(&self, event: GateEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    // Every verification path funnels through here so the gate always
    // leaves Verifying, even when the attempt write-through fails.
    fn finish_verification(&self, state: LockState) -> LockState {
        let mut inner = self.inner.lock().unwrap();
        inner.entry.clear();
        inner.locked_out = state == LockState::LockedOut;
        inner.state = state;
        state
    }

    async fn verify_entry(&self, pin: SecretString) -> AuthResult<LockState> {
        // The caller may drop this future (timeout wrapper, task abort);
        // the guard puts the gate back to entry so `Verifying` cannot
        // outlive the verification that set it.
        let guard = VerifyingGuard {
            gate: self,
            armed: true,
        };

        let verification = Uuid::new_v4();
        let user_id = self.inner.lock().unwrap().user_id.clone();

        tracing::debug!(verification = %verification, "verifying completed entry");

        let outcome = self
            .scheduler
            .execute("verify_pin", || self.remote.verify(&user_id, &pin))
            .await;

        let result = match outcome {
            Ok(outcome) if outcome.valid => self.entry_accepted(&pin, verification).await,
            Ok(outcome) => self.entry_rejected(outcome.message, verification).await,
            Err(error) => self.verification_failed(&pin, error, verification).await,
        };
        guard.disarm();
        result
    }

    async fn entry_accepted(
        &self,
        pin: &SecretString,
        verification: Uuid,
    ) -> AuthResult<LockState> {
        // Counter reset and digest refresh must not hold the unlock hostage:
        // a stale counter only under-reports successes.
        if let Err(e) = self.tracker.record_success().await {
            tracing::error!(verification = %verification, error = %e,
                "failed to reset attempt counter after accepted entry");
        }
        if let Err(e) = self.fallback.cache_accepted(pin).await {
            tracing::warn!(verification = %verification, error = %e,
                "failed to refresh PIN digest cache");
        }

        tracing::info!(verification = %verification, "entry accepted, gate unlocked");
        let state = self.finish_verification(LockState::Unlocked);
        self.emit(GateEvent::Unlocked);
        Ok(state)
    }

    async fn entry_rejected(
        &self,
        message: Option<String>,
        verification: Uuid,
    ) -> AuthResult<LockState> {
        match self.tracker.record_failure().await {
            Ok(snapshot) if snapshot.locked_out => {
                tracing::warn!(verification = %verification, attempts = snapshot.attempts,
                    "entry rejected, lockout engaged");
                let state = self.finish_verification(LockState::LockedOut);
                self.emit(GateEvent::LockedOut);
                Ok(state)
            }
            Ok(snapshot) => {
                tracing::info!(verification = %verification, attempts = snapshot.attempts,
                    remaining = snapshot.remaining,
                    message = message.as_deref().unwrap_or(""),
                    "entry rejected");
                let state = self.finish_verification(LockState::AwaitingEntry);
                self.emit(GateEvent::EntryCleared {
                    attempts_remaining: snapshot.remaining,
                });
                Ok(state)
            }
            Err(store_error) => {
                // The counter could not be persisted; fail the attempt
                // rather than proceed with an inconsistent count.
                tracing::error!(verification = %verification, error = %store_error,
                    "attempt write-through failed");
                self.finish_verification(LockState::AwaitingEntry);
                self.emit(GateEvent::VerificationError {
                    info: self.classifier.classify(&store_error),
                });
                Err(store_error)
            }
        }
    }

    async fn verification_failed(
        &self,
        pin: &SecretString,
        error: AuthError,
        verification: Uuid,
    ) -> AuthResult<LockState> {
        let info = self.classifier.classify(&error);

        match info.kind {
            // The backend never answered: consult the digest cache, and
            // leave the attempt counter untouched either way.
            ErrorKind::Network | ErrorKind::Timeout => {
                let cached = match self.fallback.verify_cached(pin).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        tracing::warn!(verification = %verification, error = %e,
                            "PIN digest cache unreadable");
                        None
                    }
                };

                match cached {
                    Some(true) => {
                        tracing::info!(verification = %verification, kind = %info.kind,
                            "offline fallback accepted entry");
                        let state = self.finish_verification(LockState::Unlocked);
                        self.emit(GateEvent::Unlocked);
                        Ok(state)
                    }
                    Some(false) => {
                        tracing::info!(verification = %verification, kind = %info.kind,
                            "offline fallback rejected entry");
                        let remaining = self.tracker.current().await.remaining;
                        let state = self.finish_verification(LockState::AwaitingEntry);
                        self.emit(GateEvent::EntryCleared {
                            attempts_remaining: remaining,
                        });
                        Ok(state)
                    }
                    None => match self.config.offline_policy {
                        OfflinePolicy::FailOpen => {
                            tracing::warn!(verification = %verification, kind = %info.kind,
                                "backend unreachable and no digest cached, failing open");
                            let state = self.finish_verification(LockState::Unlocked);
                            self.emit(GateEvent::Unlocked);
                            Ok(state)
                        }
                        OfflinePolicy::FailClosed => {
                            tracing::warn!(verification = %verification, kind = %info.kind,
                                "backend unreachable and no digest cached, staying locked");
                            let state = self.finish_verification(LockState::AwaitingEntry);
                            self.emit(GateEvent::VerificationError { info });
                            Ok(state)
                        }
                    },
                }
            }

            // Any other failure surfaces to the user; the entry is cleared
            // but never counted against the lockout.
            _ => {
                tracing::warn!(verification = %verification, kind = %info.kind,
                    message = %info.user_message, "verification failed");
                let state = self.finish_verification(LockState::AwaitingEntry);
                self.emit(GateEvent::VerificationError { info });
                Ok(state)
            }
        }
    }
}

/// Restores entry state when a verification future is dropped mid-flight.
/// Disarmed once the verification ran to completion.
struct VerifyingGuard<'a> {
    gate: &'a LockGate,
    armed: bool,
}

impl VerifyingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for VerifyingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.gate.inner.lock().unwrap();
        if inner.state == LockState::Verifying {
            inner.entry.clear();
            inner.state = LockState::AwaitingEntry;
            tracing::warn!("verification dropped mid-flight, gate returned to entry");
        }
    }
}
