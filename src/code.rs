//! Handoff codes and their peppered lookup hashes.
//!
//! The store is keyed by `hex(SHA-256(pepper ‖ code))`, never by the code.
//! Without the pepper a leaked table cannot be matched against the code
//! space, and two deployments with different peppers produce unlinkable
//! hashes for the same code.

use ring::digest::{self, SHA256};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{HandoffError, Result};
use crate::provider::CryptoProvider;

/// Characters of a generated handoff code.
pub const CODE_LEN: usize = 12;

/// Letters and digits that survive being read aloud or retyped: no `0/O`,
/// `1/l/I`.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Lowercase hex SHA-256 digest identifying one handoff record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeHash(String);

impl CodeHash {
    /// Hex length of a SHA-256 digest.
    pub const LEN: usize = 64;

    /// Accept a hash produced elsewhere, e.g. read back from storage.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let valid = hex.len() == Self::LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(hex.to_string()))
        } else {
            Err(HandoffError::InvalidCodeHash)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CodeHash {
    type Error = HandoffError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<CodeHash> for String {
    fn from(hash: CodeHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for CodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes handoff codes under a deployment-wide pepper.
#[derive(Clone)]
pub struct CodeHasher {
    pepper: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for CodeHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeHasher")
            .field("pepper", &"[REDACTED]")
            .finish()
    }
}

impl CodeHasher {
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self {
            pepper: Zeroizing::new(pepper.as_ref().to_vec()),
        }
    }

    /// `hex(SHA-256(pepper ‖ code))`.
    pub fn hash_code(&self, code: &str) -> CodeHash {
        let mut ctx = digest::Context::new(&SHA256);
        ctx.update(&self.pepper);
        ctx.update(code.as_bytes());
        CodeHash(hex::encode(ctx.finish()))
    }
}

/// Draw a fresh [`CODE_LEN`]-character code from the provider's RNG.
///
/// Bytes at or above the largest multiple of the alphabet size are thrown
/// away so every character is equally likely.
pub fn generate_code(provider: &dyn CryptoProvider) -> Result<String> {
    let alphabet = CODE_ALPHABET.len();
    let limit = 256 - (256 % alphabet);

    let mut code = String::with_capacity(CODE_LEN);
    let mut buf = [0u8; 32];
    while code.len() < CODE_LEN {
        provider.fill_random(&mut buf)?;
        for &b in buf.iter().filter(|&&b| (b as usize) < limit) {
            if code.len() == CODE_LEN {
                break;
            }
            code.push(CODE_ALPHABET[b as usize % alphabet] as char);
        }
    }
    Ok(code)
}
