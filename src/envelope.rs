//! Password-sealed envelopes.
//!
//! # Wire format
//! ```text
//! base64( [ salt (16 bytes) ][ iv (12 bytes) ][ ciphertext + tag (>= 16 bytes) ] )
//! ```
//!
//! The key is derived from the password and the envelope's own salt, so an
//! envelope is self-contained: whoever knows the password can open it and
//! nobody else learns anything, including whether a failed attempt was a
//! wrong password or a damaged envelope.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{HandoffError, Result};
use crate::keys::{self, KdfProfile, SALT_LEN};
use crate::policy::PasswordPolicy;
use crate::provider::{CryptoProvider, NONCE_LEN, TAG_LEN};

/// Smallest decoded envelope: salt, iv and an empty message's tag.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// A decoded envelope. Holds no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    salt: [u8; SALT_LEN],
    iv: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Decode and split a base64 envelope string.
    pub fn parse(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| HandoffError::MalformedEnvelope)?;
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(HandoffError::MalformedEnvelope);
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (iv, ciphertext) = rest.split_at(NONCE_LEN);

        Ok(Self {
            salt: salt.try_into().map_err(|_| HandoffError::MalformedEnvelope)?,
            iv: iv.try_into().map_err(|_| HandoffError::MalformedEnvelope)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Concatenate and base64-encode.
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(bytes)
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8; NONCE_LEN] {
        &self.iv
    }

    /// Ciphertext with the authentication tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Encrypts and decrypts envelopes with one provider, one password policy
/// and one KDF profile.
pub struct EnvelopeCodec {
    provider: Arc<dyn CryptoProvider>,
    policy: PasswordPolicy,
    profile: KdfProfile,
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("aead", &self.provider.aead_name())
            .field("policy", &self.policy)
            .field("profile", &self.profile)
            .finish()
    }
}

impl EnvelopeCodec {
    pub fn new(provider: Arc<dyn CryptoProvider>, policy: PasswordPolicy, profile: KdfProfile) -> Self {
        if profile.is_weak() {
            tracing::warn!(
                %profile,
                iterations = profile.iterations(),
                "envelope codec configured below the primary KDF cost"
            );
        }
        Self {
            provider,
            policy,
            profile,
        }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn profile(&self) -> KdfProfile {
        self.profile
    }

    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Validate `password` against the policy, then seal `plaintext`.
    pub fn encrypt(&self, plaintext: &str, password: &str) -> Result<String> {
        self.encrypt_with(plaintext, password, false)
    }

    /// Seal `plaintext`. `skip_validation` is for callers that already
    /// validated the password or pass machine-generated secrets.
    pub fn encrypt_with(&self, plaintext: &str, password: &str, skip_validation: bool) -> Result<String> {
        if !skip_validation {
            self.policy.validate(password).into_result()?;
        }

        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; NONCE_LEN];
        self.provider.fill_random(&mut salt)?;
        self.provider.fill_random(&mut iv)?;

        let key = keys::derive_key(self.provider.as_ref(), password, &salt, self.profile)?;
        let ciphertext = self.provider.seal(key.as_bytes(), iv, plaintext.as_bytes())?;

        Ok(Envelope {
            salt,
            iv,
            ciphertext,
        }
        .encode())
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Malformed input fails before any key derivation. A wrong password and
    /// a tampered envelope both yield [`HandoffError::DecryptionFailure`].
    pub fn decrypt(&self, encoded: &str, password: &str) -> Result<String> {
        let envelope = Envelope::parse(encoded)?;

        let key = keys::derive_key(self.provider.as_ref(), password, &envelope.salt, self.profile)?;
        let plaintext = self.provider.open(key.as_bytes(), envelope.iv, &envelope.ciphertext)?;

        String::from_utf8(plaintext).map_err(|_| HandoffError::MalformedEnvelope)
    }
}
