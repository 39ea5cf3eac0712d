//! Error types for handoff.
//!
//! Every variant is a distinct failure mode of the envelope or the relay.
//! Messages are intentionally minimal: they say *what* failed and never
//! carry a password, a handoff code, a code hash, a payload, or key material.

use thiserror::Error;

/// The single error type for all handoff operations.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The password failed policy validation. Carries every violated rule.
    #[error("weak password: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    /// The envelope is not valid base64, is shorter than the minimum
    /// envelope length, or does not decode to text.
    #[error("malformed envelope")]
    MalformedEnvelope,

    /// AEAD verification failed. Wrong password and tampered ciphertext are
    /// deliberately indistinguishable.
    #[error("decryption failed")]
    DecryptionFailure,

    /// Sealing failed inside the AEAD primitive.
    #[error("encryption failed")]
    EncryptionFailure,

    /// PBKDF2 could not run with the requested parameters.
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// No live record exists for the code.
    #[error("handoff not found")]
    NotFound,

    /// A record existed but its TTL had passed.
    #[error("handoff expired")]
    Expired,

    /// A stored payload was sealed under a different KDF profile than the
    /// receiving relay's codec uses.
    #[error("kdf profile mismatch: payload sealed with {stored}, relay expects {expected}")]
    ProfileMismatch { stored: String, expected: String },

    /// A TTL that cannot be represented as an expiry timestamp.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),

    /// A string passed as a code hash is not 64 lowercase hex characters.
    #[error("invalid code hash")]
    InvalidCodeHash,

    /// The storage backend failed or timed out. Transient; never a miss.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The deployment configuration is invalid or could not be read.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for HandoffError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HandoffError>;
