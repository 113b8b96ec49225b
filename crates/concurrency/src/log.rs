//! Per-transaction event log
//!
//! Every transaction keeps an append-only list of human-readable events.
//! Sequence numbers come from one [`EventSequencer`] shared by all
//! transactions of a coordinator, so entries from different transactions
//! can be merged back into a single global order.
//!
//! With [`LogView::Live`] each event is also emitted as a `tracing` event the
//! moment it is appended. With [`LogView::Deferred`] nothing is emitted while
//! the transaction runs; the owner renders the whole log once the
//! transaction terminates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tally_core::{Error, TxnId};
use tracing::info;

/// Monotonic source of event sequence numbers
///
/// The first number handed out is 1.
#[derive(Debug, Default)]
pub struct EventSequencer {
    last: AtomicU64,
}

impl EventSequencer {
    /// Create a sequencer that starts at 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last number handed out (0 if none)
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

/// How transaction events reach the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogView {
    /// Emit every event as it happens
    #[default]
    Live,
    /// Emit the full log once, when the transaction terminates
    Deferred,
}

impl FromStr for LogView {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(LogView::Live),
            "deferred" => Ok(LogView::Deferred),
            other => Err(Error::Config(format!(
                "invalid view mode '{}', expected \"live\" or \"deferred\"",
                other
            ))),
        }
    }
}

impl fmt::Display for LogView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogView::Live => write!(f, "live"),
            LogView::Deferred => write!(f, "deferred"),
        }
    }
}

/// One logged event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Global sequence number
    pub seq: u64,
    /// Event text
    pub message: String,
}

/// Append-only event log of one transaction
#[derive(Debug)]
pub struct EventLog {
    sequencer: Arc<EventSequencer>,
    view: LogView,
    entries: Vec<LogEntry>,
}

impl EventLog {
    /// Create an empty log drawing numbers from `sequencer`
    pub fn new(sequencer: Arc<EventSequencer>, view: LogView) -> Self {
        EventLog {
            sequencer,
            view,
            entries: Vec::new(),
        }
    }

    /// Append an event, returning its sequence number
    pub fn append(&mut self, tid: TxnId, message: impl Into<String>) -> u64 {
        let seq = self.sequencer.next();
        let message = message.into();
        if self.view == LogView::Live {
            info!(target: "tally::txn", seq, tid, "{}", message);
        }
        self.entries.push(LogEntry { seq, message });
        seq
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
