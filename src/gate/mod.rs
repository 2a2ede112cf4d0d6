// PIN re-authentication gate module
//
// Organized structure:
// - lock_gate.rs: The lock state machine (entry, verification, events)
// - attempts.rs: Durable consecutive-failure counter with lockout
// - validator.rs: Backend validator trait and offline digest fallback
// - biometric.rs: Biometric unlock seam (stub)

// Core state machine
pub mod lock_gate;


// Attempt counting
pub mod attempts;

// Validators
pub mod validator;

// Biometric seam
pub mod biometric;

// Re-exports for convenience
pub use lock_gate::{GateEvent, LockGate, LockState, PinState};

pub use attempts::{AttemptRecord, AttemptSnapshot, AttemptTracker};

pub use validator::{pin_digest, LocalFallbackValidator, PinValidator, VerifyOutcome};

pub use biometric::{BiometricManager, BiometricResult};
