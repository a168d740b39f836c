//! Access gate: one shared dashboard password.

use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AccessGate {
    secret: String,
}

// Never print the secret.
impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").field("secret", &"[REDACTED]").finish()
    }
}

impl AccessGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Constant-time comparison of the submitted credential.
    pub fn check(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.secret.as_bytes();
        if provided.len() != expected.len() {
            // Same amount of work whether or not the lengths match.
            let _ = expected.ct_eq(expected);
            return false;
        }
        provided.ct_eq(expected).into()
    }
}
