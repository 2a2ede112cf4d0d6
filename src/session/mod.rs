/// Session lifecycle controller
///
/// Bridges the host's lifecycle and the API layer's failures to the gate.
/// Foreground transitions re-arm the lock screen (subject to a configurable
/// debounce); an authentication-classified failure from an ordinary call
/// ends the session by clearing local credentials. The gate's own
/// verification calls are exempt: their 401 means "wrong PIN", never
/// "session expired".
use crate::error::{ErrorClassifier, ErrorInfo};
use crate::gate::{LockGate, LockState};
use crate::store::{DurableStore, KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN};
use crate::{AuthError, AuthResult, GateConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// Where an API call originated, for deciding whether its failure may end
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScope {
    /// The gate's verification call.
    PinVerification,

    /// Sign-in, refresh, and other session-management calls.
    Session,

    /// Every other backend call made on the user's behalf.
    Other,
}

/// Host lifecycle transitions fed into [`SessionController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Foregrounded,
    Backgrounded,
}

/// Session-level notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Local credentials were cleared; the host must return to sign-in.
    LoggedOut { info: ErrorInfo },
}

pub struct SessionController {
    gate: Arc<LockGate>,
    store: Arc<dyn DurableStore>,
    classifier: ErrorClassifier,
    debounce_window: Duration,
    backgrounded_at: Mutex<Option<Instant>>,
    subscribers: Mutex<Vec<UnboundedSender<SessionEvent>>>,
}

impl SessionController {
    pub fn new(gate: Arc<LockGate>, store: Arc<dyn DurableStore>, config: &GateConfig) -> Self {
        Self {
            gate,
            store,
            classifier: ErrorClassifier::new(),
            debounce_window: config.debounce_window(),
            backgrounded_at: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Receive session notifications. Each call gets its own stream.
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Consume host lifecycle events until the channel closes.
    pub async fn run(&self, mut events: UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                HostEvent::Foregrounded => {
                    self.handle_foreground();
                }
                HostEvent::Backgrounded => self.handle_background(),
            }
        }
        tracing::debug!("host event channel closed, session controller stopping");
    }

    /// Record when the app left the foreground, for the debounce check.
    pub fn handle_background(&self) {
        *self.backgrounded_at.lock().unwrap() = Some(Instant::now());
        tracing::debug!("app backgrounded");
    }

    /// Re-arm the gate on return to foreground. A background dwell shorter
    /// than the debounce window leaves the gate as it was; with the default
    /// zero window every foreground re-triggers.
    pub fn handle_foreground(&self) -> LockState {
        let dwell = self
            .backgrounded_at
            .lock()
            .unwrap()
            .take()
            .map(|at| at.elapsed());

        if let Some(dwell) = dwell {
            if dwell < self.debounce_window {
                tracing::debug!(
                    dwell_ms = dwell.as_millis() as u64,
                    "background dwell under debounce window, gate untouched"
                );
                return self.gate.state();
            }
        }

        let state = self.gate.activate();
        tracing::debug!(state = %state, "foreground transition processed");
        state
    }

    /// Classify a failed API call and, when it proves the session expired,
    /// clear local credentials. The gate's own verification calls never end
    /// the session; their authentication failures are wrong-PIN answers.
    /// Returns the classification so the caller can present it.
    pub async fn handle_api_failure(
        &self,
        scope: CallScope,
        error: &AuthError,
    ) -> AuthResult<ErrorInfo> {
        let info = self.classifier.classify(error);

        if info.should_logout && scope != CallScope::PinVerification {
            self.store
                .remove(&[KEY_AUTH_TOKEN, KEY_REFRESH_TOKEN])
                .await?;
            tracing::warn!(kind = %info.kind, scope = ?scope,
                "session expired, local credentials cleared");
            self.emit(SessionEvent::LoggedOut { info: info.clone() });
        }

        Ok(info)
    }

    fn emit(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
