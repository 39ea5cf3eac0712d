//! Bounded record of relay activity.
//!
//! The in-memory log keeps only the most recent events. Sinks see every
//! event, so anything that must be retained belongs in a sink.
//!
//! Events say what happened and on which backend. They never contain a
//! handoff code, a code hash, a payload or a password, so sinks can forward
//! them to files or log pipelines without further redaction.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Backend;

/// Events an [`EventLog`] keeps in memory by default.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// What the relay did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A payload was stored.
    Stored,
    /// A live payload was handed out.
    Retrieved,
    /// A take found nothing.
    Missed,
    /// A take found an expired record and removed it.
    Expired,
    /// A cleanup pass removed expired records.
    Purged { count: usize },
}

/// A single relay event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub backend: Backend,
    pub timestamp: DateTime<Utc>,
}

impl HandoffEvent {
    pub fn now(kind: EventKind, backend: Backend) -> Self {
        Self {
            kind,
            backend,
            timestamp: Utc::now(),
        }
    }
}

/// Receives a copy of every event. Implement this to forward events to a
/// file, a database or a log shipper.
pub trait EventSink: Send {
    fn append(&mut self, event: HandoffEvent);
}

/// Ring of recent events with optional forward sinks.
pub struct EventLog {
    events: VecDeque<HandoffEvent>,
    capacity: usize,
    forward_sinks: Vec<Box<dyn EventSink>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER)
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.events.len())
            .field("capacity", &self.capacity)
            .field("forward_sinks", &self.forward_sinks.len())
            .finish()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` events in memory. Zero keeps none and only
    /// forwards.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_BUFFER)),
            capacity,
            forward_sinks: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_forward_sink(&mut self, sink: Box<dyn EventSink>) {
        self.forward_sinks.push(sink);
    }

    /// Forward to every sink, then remember it, evicting the oldest event
    /// once the buffer is full.
    pub fn append(&mut self, event: HandoffEvent) {
        for sink in self.forward_sinks.iter_mut() {
            sink.append(event.clone());
        }
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, HandoffEvent> {
        self.events.iter()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes events as JSON lines. Creates the file if missing, appends
/// otherwise.
pub struct FileEventSink {
    file: std::fs::File,
}

impl FileEventSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl EventSink for FileEventSink {
    fn append(&mut self, event: HandoffEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
                    tracing::warn!(error = %e, "event sink write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "event serialization failed"),
        }
    }
}
