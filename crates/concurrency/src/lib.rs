//! Concurrency layer for Tally
//!
//! This crate implements optimistic concurrency control (OCC) with
//! backward validation:
//! - Transaction: read set, write set, event log, lifecycle status
//! - Validation: read set checked against the write sets of every
//!   transaction that committed while this one was running
//! - Coordinator: id/number allocation, registries of running, committed
//!   and aborted transactions, and the serialized validation+update phase

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod log;
pub mod transaction;
pub mod validation;

pub use coordinator::{Coordinator, CoordinatorStats};
pub use log::{EventLog, EventSequencer, LogEntry, LogView};
pub use transaction::{AbortReason, Transaction, TransactionStatus};
pub use validation::{validate_backward, Conflict};
