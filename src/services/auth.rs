//! Password gate for the game channel.
//!
//! DESIGN
//! ======
//! One shared secret, configured at startup. The gate stores only its
//! SHA-256 digest and compares digests without early exit. With no secret
//! configured the gate is open and connections skip `Authenticating`.

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("incorrect password")]
    Rejected,
    #[error("authenticate first")]
    Required,
}

impl crate::frame::ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected => "E_AUTH_REJECTED",
            Self::Required => "E_AUTH_REQUIRED",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordGate {
    digest: Option<[u8; 32]>,
}

impl PasswordGate {
    #[must_use]
    pub fn new(password: Option<&str>) -> Self {
        Self { digest: password.map(digest) }
    }

    /// True when no password is configured.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.digest.is_none()
    }

    /// Check a submitted credential.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` when the credential does not match.
    pub fn verify(&self, candidate: &str) -> Result<(), AuthError> {
        let Some(expected) = &self.digest else {
            return Ok(());
        };
        let submitted = digest(candidate);
        let diff = expected
            .iter()
            .zip(submitted.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 { Ok(()) } else { Err(AuthError::Rejected) }
    }
}

fn digest(input: &str) -> [u8; 32] {
    Sha256::digest(input.as_bytes()).into()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
