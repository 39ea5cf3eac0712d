//! The sender and receiver flows, end to end.
//!
//! ```text
//! send:    validate -> derive -> seal -> hash(code) -> put
//! receive: hash(code) -> take -> derive -> open
//! ```
//!
//! Key derivation and store calls run on tokio's blocking pool, so a send or
//! receive never stalls the executor for a PBKDF2 run or a busy database.
//!
//! The stored payload names the KDF profile it was sealed under. A relay
//! refuses payloads from another profile instead of failing decryption.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::code::{self, CodeHasher};
use crate::config::{BackendKind, RelayConfig};
use crate::envelope::EnvelopeCodec;
use crate::error::{HandoffError, Result};
use crate::events::{EventKind, EventLog, EventSink, FileEventSink, HandoffEvent};
use crate::provider::RingProvider;
use crate::reaper::ExpiryReaper;
use crate::store::{Backend, Cleanup, HandoffStore, MemoryStore, SqliteStore, Taken};

/// Version of [`HandoffPayload`].
pub const PAYLOAD_VERSION: u8 = 1;

/// What the relay hands to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub v: u8,
    /// KDF profile the envelope was sealed under, e.g. `"primary"`.
    pub kdf: String,
    /// The envelope string.
    pub ciphertext: String,
}

pub struct Relay {
    codec: Arc<EnvelopeCodec>,
    hasher: CodeHasher,
    store: Arc<dyn HandoffStore>,
    events: Mutex<EventLog>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("codec", &self.codec)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl Relay {
    pub fn new(codec: EnvelopeCodec, hasher: CodeHasher, store: Arc<dyn HandoffStore>) -> Self {
        Self::with_event_log(codec, hasher, store, EventLog::new())
    }

    pub fn with_event_log(
        codec: EnvelopeCodec,
        hasher: CodeHasher,
        store: Arc<dyn HandoffStore>,
        events: EventLog,
    ) -> Self {
        Self {
            codec: Arc::new(codec),
            hasher,
            store,
            events: Mutex::new(events),
        }
    }

    /// Build provider, codec, hasher and store from a configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let provider = Arc::new(RingProvider::new(config.crypto.aead()?));
        let codec = EnvelopeCodec::new(provider, config.policy, config.kdf.profile);
        let hasher = CodeHasher::new(config.resolve_pepper()?.as_bytes());

        let store: Arc<dyn HandoffStore> = match config.store.backend {
            BackendKind::Memory => Arc::new(MemoryStore::new(config.store.mode)),
            BackendKind::Sqlite => Arc::new(SqliteStore::open(&config.store.path, config.store.mode)?),
        };

        let mut events = EventLog::with_capacity(config.events.buffer);
        if let Some(path) = &config.events.file {
            let sink = FileEventSink::new(path)
                .map_err(|e| HandoffError::Config(format!("{}: {e}", path.display())))?;
            events.add_forward_sink(Box::new(sink));
        }

        tracing::info!(
            backend = %store.backend(),
            aead = codec.provider().aead_name(),
            profile = %codec.profile(),
            "relay ready"
        );

        Ok(Self::with_event_log(codec, hasher, store, events))
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn store(&self) -> Arc<dyn HandoffStore> {
        Arc::clone(&self.store)
    }

    /// A fresh handoff code from the codec's RNG.
    pub fn generate_code(&self) -> Result<String> {
        code::generate_code(self.codec.provider().as_ref())
    }

    pub fn add_event_sink(&self, sink: Box<dyn EventSink>) {
        self.events.lock().add_forward_sink(sink);
    }

    /// Start an [`ExpiryReaper`] over this relay's store. Must be called
    /// inside a tokio runtime.
    pub fn spawn_reaper(&self, every: Duration) -> ExpiryReaper {
        ExpiryReaper::spawn(self.store(), every)
    }

    /// Snapshot of the buffered events, oldest first.
    pub fn events(&self) -> Vec<HandoffEvent> {
        self.events.lock().iter().cloned().collect()
    }

    fn record(&self, kind: EventKind, backend: Backend) {
        self.events.lock().append(HandoffEvent::now(kind, backend));
    }

    /// Seal `plaintext` under `passphrase` and park it under `code` for `ttl`.
    pub async fn send(
        &self,
        code: &str,
        passphrase: &str,
        plaintext: &str,
        ttl: chrono::Duration,
    ) -> Result<Backend> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| HandoffError::InvalidTtl(format!("{}s is out of range", ttl.num_seconds())))?;

        let codec = Arc::clone(&self.codec);
        let passphrase = zeroize::Zeroizing::new(passphrase.to_string());
        let plaintext = zeroize::Zeroizing::new(plaintext.to_string());

        let ciphertext = run_blocking(
            move || codec.encrypt(&plaintext, &passphrase),
            HandoffError::EncryptionFailure,
        )
        .await?;

        let payload = serde_json::to_value(HandoffPayload {
            v: PAYLOAD_VERSION,
            kdf: self.codec.profile().to_string(),
            ciphertext,
        })
        .map_err(|_| HandoffError::EncryptionFailure)?;

        let store = Arc::clone(&self.store);
        let hash = self.hasher.hash_code(code);
        let backend = run_blocking(
            move || store.put(&hash, payload, expires_at),
            storage_task_failed(),
        )
        .await?;

        tracing::debug!(%backend, ttl_secs = ttl.num_seconds(), "handoff stored");
        self.record(EventKind::Stored, backend);
        Ok(backend)
    }

    /// Claim the payload parked under `code` and open it with `passphrase`.
    ///
    /// In single-use mode the record is consumed by this call even when the
    /// passphrase turns out to be wrong.
    pub async fn receive(&self, code: &str, passphrase: &str) -> Result<String> {
        let store = Arc::clone(&self.store);
        let hash = self.hasher.hash_code(code);
        let taken = run_blocking(move || store.take(&hash), storage_task_failed()).await?;
        let backend = taken.backend;

        let payload = match taken.outcome {
            Taken::Found(payload) => payload,
            Taken::Expired => {
                self.record(EventKind::Expired, backend);
                return Err(HandoffError::Expired);
            }
            Taken::Missing => {
                self.record(EventKind::Missed, backend);
                return Err(HandoffError::NotFound);
            }
        };
        self.record(EventKind::Retrieved, backend);

        let payload: HandoffPayload =
            serde_json::from_value(payload).map_err(|_| HandoffError::MalformedEnvelope)?;
        if payload.v != PAYLOAD_VERSION {
            return Err(HandoffError::MalformedEnvelope);
        }
        let expected = self.codec.profile().to_string();
        if payload.kdf != expected {
            tracing::warn!(stored = %payload.kdf, %expected, "payload sealed under another kdf profile");
            return Err(HandoffError::ProfileMismatch {
                stored: payload.kdf,
                expected,
            });
        }

        let codec = Arc::clone(&self.codec);
        let passphrase = zeroize::Zeroizing::new(passphrase.to_string());
        run_blocking(
            move || codec.decrypt(&payload.ciphertext, &passphrase),
            HandoffError::KeyDerivationFailure,
        )
        .await
    }

    /// One cleanup pass over the store.
    pub fn cleanup_expired(&self) -> Result<Cleanup> {
        let cleanup = crate::reaper::sweep(self.store.as_ref())?;
        if cleanup.purged > 0 {
            self.record(EventKind::Purged { count: cleanup.purged }, cleanup.backend);
        }
        Ok(cleanup)
    }
}

/// Run `f` on the blocking pool. `on_join_error` is returned if the task
/// panics or is cancelled.
async fn run_blocking<T, F>(f: F, on_join_error: HandoffError) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|_| on_join_error)?
}

fn storage_task_failed() -> HandoffError {
    HandoffError::StorageUnavailable("storage task failed".to_string())
}
