//! Password strength rules applied before a password is used for key
//! derivation.
//!
//! Every rule is checked independently so the caller can show the full list
//! of problems at once.

use serde::{Deserialize, Serialize};

use crate::error::{HandoffError, Result};

/// Minimum length of the primary profile.
pub const DEFAULT_MIN_LENGTH: usize = 16;

/// Minimum length of the lax profile used by lighter-weight clients.
pub const LAX_MIN_LENGTH: usize = 8;

/// Upper bound on password length for every profile.
pub const DEFAULT_MAX_LENGTH: usize = 128;

/// Tokens that reject a password when found anywhere in it, ignoring case.
pub const WEAK_PATTERNS: &[&str] = &[
    "password", "123456", "12345678", "qwerty", "abc123", "monkey", "1234567",
    "letmein", "trustno1", "dragon", "baseball", "iloveyou", "master", "sunshine",
    "ashley", "bailey", "passw0rd", "shadow", "123123", "654321", "superman",
    "qazwsx", "michael", "football", "welcome", "jesus", "ninja", "mustang",
];

/// Length bounds for a deployment. Character-class and blacklist rules are
/// fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Outcome of [`PasswordPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl PolicyReport {
    /// `Ok(())` when valid, otherwise [`HandoffError::WeakPassword`].
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(HandoffError::WeakPassword(self.errors))
        }
    }
}

impl PasswordPolicy {
    /// The 8-character profile. Pick one profile per deployment.
    pub fn lax() -> Self {
        Self {
            min_length: LAX_MIN_LENGTH,
            ..Self::default()
        }
    }

    /// Check `password` against every rule. Pure; never logs its input.
    pub fn validate(&self, password: &str) -> PolicyReport {
        let mut errors = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            errors.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if length > self.max_length {
            errors.push(format!(
                "Password must not exceed {} characters",
                self.max_length
            ));
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one digit".to_string());
        }
        if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
            errors.push("Password must contain at least one special character".to_string());
        }

        let lower = password.to_lowercase();
        if WEAK_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
            errors.push("Password contains common weak patterns".to_string());
        }

        PolicyReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}
