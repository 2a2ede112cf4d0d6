/// Biometric unlock seam (stub)
///
/// Platform biometrics are out of scope for this crate. The manager exists
/// so hosts wire against a stable seam today and drop a platform
/// implementation in later; until then every probe reports `Unavailable`
/// and entry falls through to the PIN.
use crate::AuthResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricResult {
    /// No platform implementation is wired in.
    Unavailable,

    /// The platform accepted the biometric.
    Accepted,

    /// The platform rejected or cancelled the prompt.
    Rejected,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BiometricManager;

impl BiometricManager {
    pub fn new() -> Self {
        Self
    }

    /// Whether a biometric unlock can be offered at all.
    pub fn is_available(&self) -> bool {
        false
    }

    /// Attempt a biometric unlock. Stub: always falls through to the PIN.
    pub async fn try_unlock(&self) -> AuthResult<BiometricResult> {
        Ok(BiometricResult::Unavailable)
    }
}
