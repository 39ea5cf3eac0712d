//! Cryptographic primitives behind one capability interface.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `code`, which only needs SHA-256). Everything else
//! reaches randomness, PBKDF2 and AEAD through a [`CryptoProvider`] value
//! handed to it at construction time.
//!
//! Primitive choices for [`RingProvider`]:
//! - **Cipher**: AES-256-GCM, or ChaCha20-Poly1305 as a compatibility shim
//! - **Nonce**: 96-bit (12 bytes), supplied by the caller
//! - **Key size**: 256 bits (32 bytes)
//! - **Tag**: 128 bits (16 bytes) for both ciphers
//!
//! Envelopes sealed by one cipher do not open under the other.

use std::num::NonZeroU32;

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, CHACHA20_POLY1305};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{HandoffError, Result};

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the AEAD authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Randomness, password-based key derivation and authenticated encryption.
///
/// Implementations must be usable from several threads at once; the relay
/// runs key derivation on blocking worker threads.
pub trait CryptoProvider: Send + Sync {
    /// Short identifier of the AEAD construction, e.g. `"aes-256-gcm"`.
    fn aead_name(&self) -> &'static str;

    /// Fill `dest` with cryptographically secure random bytes.
    fn fill_random(&self, dest: &mut [u8]) -> Result<()>;

    /// PBKDF2-HMAC-SHA256 of `secret` under `salt`, writing `out.len()` bytes.
    fn pbkdf2_sha256(&self, iterations: NonZeroU32, salt: &[u8], secret: &[u8], out: &mut [u8]);

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    fn seal(&self, key: &[u8; KEY_LEN], nonce: [u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Verify and decrypt `ciphertext` (tag appended). No partial plaintext
    /// is ever returned.
    fn open(&self, key: &[u8; KEY_LEN], nonce: [u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// AEAD choice for [`RingProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aead {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Aead {
    fn algorithm(self) -> &'static aead::Algorithm {
        match self {
            Self::Aes256Gcm => &AES_256_GCM,
            Self::ChaCha20Poly1305 => &CHACHA20_POLY1305,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

/// [`CryptoProvider`] backed by `ring`.
pub struct RingProvider {
    aead: Aead,
    rng: SystemRandom,
}

impl RingProvider {
    /// The primary provider: AES-256-GCM.
    pub fn aes_256_gcm() -> Self {
        Self::new(Aead::Aes256Gcm)
    }

    /// Compatibility shim for targets without fast AES. Same contract,
    /// incompatible ciphertexts.
    pub fn chacha20_poly1305() -> Self {
        Self::new(Aead::ChaCha20Poly1305)
    }

    pub fn new(aead: Aead) -> Self {
        Self {
            aead,
            rng: SystemRandom::new(),
        }
    }

    fn key(&self, key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(self.aead.algorithm(), key_bytes)
            .map_err(|_| HandoffError::KeyDerivationFailure)?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl Default for RingProvider {
    fn default() -> Self {
        Self::aes_256_gcm()
    }
}

impl std::fmt::Debug for RingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingProvider").field("aead", &self.aead).finish()
    }
}

impl CryptoProvider for RingProvider {
    fn aead_name(&self) -> &'static str {
        self.aead.name()
    }

    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        self.rng
            .fill(dest)
            .map_err(|_| HandoffError::RandomnessFailure)
    }

    fn pbkdf2_sha256(&self, iterations: NonZeroU32, salt: &[u8], secret: &[u8], out: &mut [u8]) {
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, secret, out);
    }

    fn seal(&self, key: &[u8; KEY_LEN], nonce: [u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key(key)?;
        let mut in_out = Vec::with_capacity(plaintext.len() + TAG_LEN);
        in_out.extend_from_slice(plaintext);

        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            aead::Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| HandoffError::EncryptionFailure)?;

        Ok(in_out)
    }

    fn open(&self, key: &[u8; KEY_LEN], nonce: [u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(HandoffError::DecryptionFailure);
        }

        let key = self.key(key)?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce),
                aead::Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| HandoffError::DecryptionFailure)?;

        Ok(plaintext.to_vec())
    }
}
