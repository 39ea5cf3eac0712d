//! Deployment configuration, loaded from TOML.
//!
//! ```toml
//! pepper_env = "HANDOFF_PEPPER"
//!
//! [policy]
//! min_length = 16
//!
//! [kdf]
//! profile = "primary"
//!
//! [crypto]
//! aead = "aes-256-gcm"
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/handoff/handoff.db"
//! mode = "single-use"
//!
//! [events]
//! buffer = 1024
//! file = "/var/log/handoff/events.jsonl"
//! ```
//!
//! `[kdf] profile` accepts only `"primary"` and `"legacy"`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{HandoffError, Result};
use crate::events::DEFAULT_EVENT_BUFFER;
use crate::keys::KdfProfile;
use crate::policy::PasswordPolicy;
use crate::provider::Aead;
use crate::store::RetrievalMode;

/// Environment variable read for the pepper when the file names none.
pub const DEFAULT_PEPPER_ENV: &str = "HANDOFF_PEPPER";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Literal pepper. Prefer `pepper_env` so the secret stays out of files.
    #[serde(skip_serializing)]
    pub pepper: Option<String>,
    /// Environment variable holding the pepper.
    pub pepper_env: String,
    pub policy: PasswordPolicy,
    pub kdf: KdfConfig,
    pub crypto: CryptoConfig,
    pub store: StoreConfig,
    pub events: EventsConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pepper: None,
            pepper_env: DEFAULT_PEPPER_ENV.to_string(),
            policy: PasswordPolicy::default(),
            kdf: KdfConfig::default(),
            crypto: CryptoConfig::default(),
            store: StoreConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// "primary" (600,000 iterations) or "legacy" (100,000).
    pub profile: KdfProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// "aes-256-gcm" or "chacha20-poly1305".
    pub aead: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            aead: "aes-256-gcm".to_string(),
        }
    }
}

impl CryptoConfig {
    pub fn aead(&self) -> Result<Aead> {
        match self.aead.as_str() {
            "aes-256-gcm" => Ok(Aead::Aes256Gcm),
            "chacha20-poly1305" => Ok(Aead::ChaCha20Poly1305),
            other => Err(HandoffError::Config(format!("unknown aead: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Database file for the sqlite backend.
    pub path: PathBuf,
    pub mode: RetrievalMode,
    /// TTL applied when a sender does not choose one (default: 24 h).
    pub default_ttl_secs: u64,
    /// Reaper interval (default: 5 min).
    pub reap_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: PathBuf::from("handoff.db"),
            mode: RetrievalMode::SingleUse,
            default_ttl_secs: 24 * 60 * 60,
            reap_interval_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Most recent events kept in memory; older ones are dropped.
    pub buffer: usize,
    /// Optional JSON-lines file every event is forwarded to.
    pub file: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_EVENT_BUFFER,
            file: None,
        }
    }
}

/// Convert a TTL in whole seconds, rejecting values chrono cannot hold.
pub fn ttl_from_secs(secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| HandoffError::InvalidTtl(format!("{secs}s is out of range")))
}

impl RelayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| HandoffError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HandoffError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// The literal pepper if set, otherwise the value of `pepper_env`.
    /// Empty peppers are rejected.
    pub fn resolve_pepper(&self) -> Result<Zeroizing<String>> {
        let pepper = match &self.pepper {
            Some(p) => Zeroizing::new(p.clone()),
            None => Zeroizing::new(std::env::var(&self.pepper_env).map_err(|_| {
                HandoffError::Config(format!("pepper not set (expected ${})", self.pepper_env))
            })?),
        };

        if pepper.is_empty() {
            return Err(HandoffError::Config("pepper must not be empty".to_string()));
        }
        Ok(pepper)
    }

    pub fn default_ttl(&self) -> Result<chrono::Duration> {
        ttl_from_secs(self.store.default_ttl_secs)
    }

    pub fn reap_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.store.reap_interval_secs)
    }
}
