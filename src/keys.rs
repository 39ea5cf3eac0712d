//! Password-based key derivation and key ownership.
//!
//! This module owns two responsibilities:
//! 1. Deriving a 256-bit envelope key from a password and a per-envelope
//!    salt with PBKDF2-HMAC-SHA256.
//! 2. Holding derived key material in a type that is opaque, non-cloneable,
//!    and zeroised on drop.
//!
//! ## Profiles
//!
//! The iteration count is the brute-force cost of every guess. It is named
//! by a [`KdfProfile`] and fixed per codec, so two counts are never mixed
//! silently. Envelopes carry no profile marker (the relay records it in the
//! stored payload instead). A deployment that changes profile must migrate
//! or keep a second codec for the old envelopes.
//!
//! `Custom` never deserializes, so no configuration file can name it.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{HandoffError, Result};
use crate::provider::{CryptoProvider, KEY_LEN};

/// Size of the per-envelope salt in bytes.
pub const SALT_LEN: usize = 16;

/// Iterations of the primary profile.
pub const PRIMARY_ITERATIONS: u32 = 600_000;

/// Iterations of the weaker legacy profile.
pub const LEGACY_ITERATIONS: u32 = 100_000;

/// A named PBKDF2 cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfProfile {
    /// 600,000 iterations.
    Primary,
    /// 100,000 iterations. Only for reading envelopes from older clients.
    Legacy,
    /// Arbitrary count for benchmarks and tests. Constructible in code only.
    #[serde(skip_deserializing)]
    Custom(u32),
}

impl Default for KdfProfile {
    fn default() -> Self {
        Self::Primary
    }
}

impl KdfProfile {
    pub fn iterations(self) -> u32 {
        match self {
            Self::Primary => PRIMARY_ITERATIONS,
            Self::Legacy => LEGACY_ITERATIONS,
            Self::Custom(n) => n,
        }
    }

    /// Anything below the primary count.
    pub fn is_weak(self) -> bool {
        self.iterations() < PRIMARY_ITERATIONS
    }
}

impl std::fmt::Display for KdfProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Legacy => write!(f, "legacy"),
            Self::Custom(n) => write!(f, "custom({n})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A key derived for exactly one envelope.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Raw bytes are only reachable inside the crate.
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// `pub(crate)` so raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive the envelope key for `password` under `salt`.
///
/// Deterministic for the same `(password, salt, profile)`. Intentionally
/// slow; async callers should run it on a blocking thread.
pub fn derive_key(
    provider: &dyn CryptoProvider,
    password: &str,
    salt: &[u8; SALT_LEN],
    profile: KdfProfile,
) -> Result<DerivedKey> {
    let iterations =
        NonZeroU32::new(profile.iterations()).ok_or(HandoffError::KeyDerivationFailure)?;

    let mut bytes = [0u8; KEY_LEN];
    provider.pbkdf2_sha256(iterations, salt, password.as_bytes(), &mut bytes);

    Ok(DerivedKey { bytes })
}
