//! In-process backend. One mutex serialises every operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Backend, Cleanup, HandoffRecord, HandoffStore, Payload, RetrievalMode, TakeResult, Taken};
use crate::code::CodeHash;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    mode: RetrievalMode,
    records: Mutex<HashMap<CodeHash, HandoffRecord>>,
}

impl MemoryStore {
    pub fn new(mode: RetrievalMode) -> Self {
        Self {
            mode,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// Records currently held, live or not yet purged.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of a record without counting it as a retrieval.
    pub fn peek(&self, code_hash: &CodeHash) -> Option<HandoffRecord> {
        self.records.lock().get(code_hash).cloned()
    }
}

impl HandoffStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn put(&self, code_hash: &CodeHash, payload: Payload, expires_at: DateTime<Utc>) -> Result<Backend> {
        self.records
            .lock()
            .insert(code_hash.clone(), HandoffRecord::new(payload, expires_at));
        Ok(Backend::Memory)
    }

    fn take(&self, code_hash: &CodeHash) -> Result<TakeResult> {
        let now = Utc::now();
        let mut records = self.records.lock();

        let outcome = match records.get(code_hash).map(|r| r.is_expired_at(now)) {
            None => Taken::Missing,
            Some(true) => {
                records.remove(code_hash);
                Taken::Expired
            }
            Some(false) => match self.mode {
                RetrievalMode::SingleUse => records
                    .remove(code_hash)
                    .map_or(Taken::Missing, |record| Taken::Found(record.payload)),
                RetrievalMode::MultiUse => match records.get_mut(code_hash) {
                    Some(record) => {
                        record.retrieved_count += 1;
                        record.last_retrieved_at = Some(now);
                        Taken::Found(record.payload.clone())
                    }
                    None => Taken::Missing,
                },
            },
        };

        Ok(TakeResult {
            backend: Backend::Memory,
            outcome,
        })
    }

    fn cleanup_expired(&self) -> Result<Cleanup> {
        let now = Utc::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));

        Ok(Cleanup {
            backend: Backend::Memory,
            purged: before - records.len(),
        })
    }
}
