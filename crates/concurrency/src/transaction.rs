//! Transaction record for OCC
//!
//! A `Transaction` is the tentative state of one client transaction: the
//! accounts it has read, the balances it intends to write, and its event
//! log. Nothing it does is visible to other transactions until the
//! coordinator validates it and installs its write set.
//!
//! # Read-Your-Writes Semantics
//!
//! A read is served from the write set when this transaction already wrote
//! the account, and from the account store otherwise. Either way the
//! account joins the read set.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──close──▶ Validating ──▶ Committed
//!    │                    └───────▶ Aborted
//!    └──────abort────────────────▶ Aborted
//! ```
//!
//! Terminal states are absorbing. Only the coordinator moves a record out
//! of `Running`.

use crate::log::{EventLog, EventSequencer, LogEntry, LogView};
use crate::validation::Conflict;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{AccountId, AccountStorage, Balance, Error, Result, TxnId, TxnNumber};

/// Why a transaction ended up aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Backward validation found an overlapping committed writer
    Conflict(Conflict),
    /// The client sent ABORT_TRANSACTION
    ClientRequested,
    /// The client connection dropped mid-transaction
    Disconnected,
    /// The client broke the message protocol
    ProtocolViolation(String),
    /// The server was shut down while the transaction was running
    Shutdown,
    /// Validation passed but the account store rejected a write. Earlier
    /// writes of the same transaction may already be installed.
    InstallFailed(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Conflict(c) => write!(f, "validation failed: {}", c),
            AbortReason::ClientRequested => write!(f, "aborted by client"),
            AbortReason::Disconnected => write!(f, "client disconnected"),
            AbortReason::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            AbortReason::Shutdown => write!(f, "server shutdown"),
            AbortReason::InstallFailed(msg) => write!(f, "install failed: {}", msg),
        }
    }
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Executing; reads and writes allowed
    Running,
    /// Holding a validation number, being checked against committed history
    Validating,
    /// Write set installed into the account store
    Committed,
    /// Discarded without any effect on the account store
    Aborted {
        /// Why it was aborted
        reason: AbortReason,
    },
}

impl TransactionStatus {
    /// Committed or aborted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::Aborted { .. }
        )
    }

    /// Lower-case status name, as shown in logs
    pub fn name(&self) -> &'static str {
        match self {
            TransactionStatus::Running => "running",
            TransactionStatus::Validating => "validating",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Tentative state of one transaction
#[derive(Debug)]
pub struct Transaction {
    tid: TxnId,
    /// Assigned at validation entry
    tnum: Option<TxnNumber>,
    /// Last validation number handed out when this transaction opened.
    /// Committed transactions numbered above it overlap with this one.
    snapshot_tnum: TxnNumber,
    read_set: BTreeSet<AccountId>,
    /// Latest tentative balance per written account
    write_set: BTreeMap<AccountId, Balance>,
    log: EventLog,
    status: TransactionStatus,
    opened_at: Instant,
}

impl Transaction {
    /// Create a running transaction
    ///
    /// Only [`Coordinator::open`](crate::Coordinator::open) creates
    /// records that the coordinator will accept.
    pub(crate) fn new(
        tid: TxnId,
        snapshot_tnum: TxnNumber,
        sequencer: Arc<EventSequencer>,
        view: LogView,
    ) -> Self {
        Transaction {
            tid,
            tnum: None,
            snapshot_tnum,
            read_set: BTreeSet::new(),
            write_set: BTreeMap::new(),
            log: EventLog::new(sequencer, view),
            status: TransactionStatus::Running,
            opened_at: Instant::now(),
        }
    }

    // === Operations ===

    /// Read the balance of `account` as this transaction sees it
    ///
    /// Returns the tentative balance if this transaction wrote `account`,
    /// the committed balance otherwise. On success `account` is in the
    /// read set afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the transaction is not running
    /// - `UnknownAccount` from the store; the read set is left unchanged
    pub fn read<S: AccountStorage + ?Sized>(
        &mut self,
        store: &S,
        account: AccountId,
    ) -> Result<Balance> {
        self.ensure_running("read")?;

        let balance = match self.write_set.get(&account) {
            Some(tentative) => *tentative,
            None => store.read(account)?,
        };
        self.read_set.insert(account);
        Ok(balance)
    }

    /// Tentatively set the balance of `account`, returning the previous one
    ///
    /// The previous balance is this transaction's own earlier write if there
    /// is one, the committed balance otherwise. Writing does not add the
    /// account to the read set.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the transaction is not running
    /// - `UnknownAccount` from the store; the write set is left unchanged
    pub fn write<S: AccountStorage + ?Sized>(
        &mut self,
        store: &S,
        account: AccountId,
        balance: Balance,
    ) -> Result<Balance> {
        self.ensure_running("write")?;

        let previous = match self.write_set.get(&account) {
            Some(tentative) => *tentative,
            None => store.read(account)?,
        };
        self.write_set.insert(account, balance);
        Ok(previous)
    }

    /// Append an event to this transaction's log, returning its sequence number
    pub fn log(&mut self, event: impl Into<String>) -> u64 {
        self.log.append(self.tid, event)
    }

    // === Accessors ===

    /// Transaction id
    pub fn tid(&self) -> TxnId {
        self.tid
    }

    /// Validation number, once validation has started
    pub fn tnum(&self) -> Option<TxnNumber> {
        self.tnum
    }

    /// Validation counter observed at open
    pub fn snapshot_tnum(&self) -> TxnNumber {
        self.snapshot_tnum
    }

    /// Accounts read at least once
    pub fn read_set(&self) -> &BTreeSet<AccountId> {
        &self.read_set
    }

    /// Tentative balances
    pub fn write_set(&self) -> &BTreeMap<AccountId, Balance> {
        &self.write_set
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Logged events, oldest first
    pub fn log_entries(&self) -> &[LogEntry] {
        self.log.entries()
    }

    /// Check if the transaction can still read and write
    pub fn is_running(&self) -> bool {
        self.status == TransactionStatus::Running
    }

    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Check if the transaction aborted, for any reason
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Why the transaction aborted, if it did
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// The validation conflict, if validation is what aborted it
    pub fn conflict(&self) -> Option<&Conflict> {
        match self.abort_reason() {
            Some(AbortReason::Conflict(conflict)) => Some(conflict),
            _ => None,
        }
    }

    /// Time since open
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Render the full event log, one line per event
    pub fn render_log(&self) -> String {
        let mut out = format!("Transaction #{} ({})", self.tid, self.status.name());
        for entry in self.log.entries() {
            let _ = write!(out, "\n{:>6} {}", entry.seq, entry.message);
        }
        out
    }

    // === State transitions (coordinator only) ===

    pub(crate) fn begin_validation(&mut self, tnum: TxnNumber) -> Result<()> {
        self.ensure_running("validate")?;
        self.tnum = Some(tnum);
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Validating {
            return Err(Error::invalid_state(format!(
                "transaction #{} cannot commit while {}",
                self.tid,
                self.status.name()
            )));
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    pub(crate) fn mark_aborted(&mut self, reason: AbortReason) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::invalid_state(format!(
                "transaction #{} is already {}",
                self.tid,
                self.status.name()
            )));
        }
        self.status = TransactionStatus::Aborted { reason };
        Ok(())
    }

    fn ensure_running(&self, op: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "cannot {} in transaction #{}: it is {}",
                op,
                self.tid,
                self.status.name()
            )))
        }
    }
}
