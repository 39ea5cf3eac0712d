//! Code-hash-keyed, time-limited relay for opaque payloads.
//!
//! ```text
//! Absent --put--> Stored --take--> Absent          (single-use)
//!                   |  \--take--> Stored, count+1  (multi-use)
//!                   \--expiry (take / cleanup)--> Absent
//! ```
//!
//! Two backends implement [`HandoffStore`]: [`MemoryStore`] for a single
//! process and [`SqliteStore`] for a persistent table. Pick one at
//! construction and hold it as `Arc<dyn HandoffStore>`.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::code::CodeHash;
use crate::error::Result;

/// Whatever the caller stored. Never inspected by a store.
pub type Payload = serde_json::Value;

/// Which backend served an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Persistent,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

/// What a successful `take` does to a live record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMode {
    /// Deleted by the first successful take.
    #[default]
    SingleUse,
    /// Kept until expiry; every take is counted.
    MultiUse,
}

/// One stored handoff.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffRecord {
    pub payload: Payload,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub retrieved_count: u32,
    pub last_retrieved_at: Option<DateTime<Utc>>,
}

impl HandoffRecord {
    pub fn new(payload: Payload, expires_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            expires_at,
            created_at: Utc::now(),
            retrieved_count: 0,
            last_retrieved_at: None,
        }
    }

    /// Past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Outcome of a take.
#[derive(Debug, Clone, PartialEq)]
pub enum Taken {
    Found(Payload),
    /// The record existed but had expired; it has now been deleted.
    Expired,
    /// Never stored, already consumed, or already purged.
    Missing,
}

/// A take outcome tagged with the backend that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeResult {
    pub backend: Backend,
    pub outcome: Taken,
}

impl TakeResult {
    pub fn found(&self) -> bool {
        matches!(self.outcome, Taken::Found(_))
    }

    pub fn expired(&self) -> bool {
        matches!(self.outcome, Taken::Expired)
    }

    pub fn into_payload(self) -> Option<Payload> {
        match self.outcome {
            Taken::Found(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cleanup {
    pub backend: Backend,
    pub purged: usize,
}

/// A relay of opaque payloads keyed by code hash.
///
/// Implementations are shared across threads; every method is atomic with
/// respect to the others for the same hash.
pub trait HandoffStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Insert or replace the record for `code_hash`.
    fn put(&self, code_hash: &CodeHash, payload: Payload, expires_at: DateTime<Utc>) -> Result<Backend>;

    /// Retrieve the record for `code_hash` according to the store's
    /// [`RetrievalMode`]. Expired records are deleted and reported as
    /// [`Taken::Expired`].
    fn take(&self, code_hash: &CodeHash) -> Result<TakeResult>;

    /// Delete every record whose expiry is in the past.
    fn cleanup_expired(&self) -> Result<Cleanup>;
}
