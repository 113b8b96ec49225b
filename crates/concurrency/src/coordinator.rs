//! Transaction coordinator
//!
//! The coordinator owns everything transactions share: the id and
//! validation-number counters and the registries of running, committed
//! and aborted transactions. Workers hold an `Arc<Coordinator>`; the
//! coordinator never calls back into workers.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. lock registry
//! 2. remove from running, assign tnum = ++last_tnum     (Validating)
//! 3. scan committed[(snapshot_tnum, tnum)] against read set
//! 4. IF conflict: record in aborted                      (Aborted)
//! 5. ELSE: install write set into the account store,
//!          record in committed[tnum]                     (Committed)
//! 6. unlock registry
//! ```
//!
//! If the store rejects a write in step 5, the record goes to the aborted
//! registry with [`AbortReason::InstallFailed`] and `close` returns
//! `Error::Internal`.
//!
//! The registry lock is also held while opening. Since open and
//! validation+update exclude each other, every transaction numbered at or
//! below a new transaction's snapshot number has finished installing its
//! writes before the new transaction can read anything.

use crate::log::{EventSequencer, LogView};
use crate::transaction::{AbortReason, Transaction};
use crate::validation::{overlapping_range, validate_backward};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_core::{AccountStorage, Error, Result, TxnId, TxnNumber};
use tracing::{debug, error, info};

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Transactions currently running
    pub running: u64,
    /// Transactions ever opened
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions aborted, by the client or by validation
    pub aborted: u64,
    /// Aborts caused by failed validation
    pub validation_failures: u64,
}

impl CoordinatorStats {
    /// Fraction of finished transactions that committed
    pub fn commit_rate(&self) -> f64 {
        let finished = self.committed + self.aborted;
        if finished > 0 {
            self.committed as f64 / finished as f64
        } else {
            0.0
        }
    }
}

/// Shared transaction state
///
/// Nothing is ever evicted: `committed` and `aborted` hold every finished
/// transaction for the lifetime of the coordinator, so memory grows with
/// the number of transactions served.
#[derive(Debug, Default)]
struct Registry {
    last_tid: TxnId,
    last_tnum: TxnNumber,
    /// Running transactions and the snapshot number each was opened with
    running: BTreeMap<TxnId, TxnNumber>,
    committed: BTreeMap<TxnNumber, Arc<Transaction>>,
    aborted: Vec<Arc<Transaction>>,
    started: u64,
    validation_failures: u64,
}

impl Registry {
    /// Remove `txn` from the running set if it is the record `open` handed out
    fn take_running(&mut self, txn: &Transaction) -> Result<()> {
        let tid = txn.tid();
        match self.running.get(&tid) {
            Some(&snapshot) if txn.is_running() && snapshot == txn.snapshot_tnum() => {
                self.running.remove(&tid);
                Ok(())
            }
            Some(&snapshot) if snapshot != txn.snapshot_tnum() => {
                Err(Error::invalid_state(format!(
                    "transaction #{} was opened at snapshot tnum {}, not {}",
                    tid,
                    snapshot,
                    txn.snapshot_tnum()
                )))
            }
            _ => Err(Error::invalid_state(format!(
                "transaction #{} is not running",
                tid
            ))),
        }
    }
}

/// OCC coordinator over an account store `S`
///
/// Finished transactions are retained for inspection and are never pruned
/// (see [`committed_transactions`](Self::committed_transactions)).
pub struct Coordinator<S> {
    store: Arc<S>,
    sequencer: Arc<EventSequencer>,
    view: LogView,
    registry: Mutex<Registry>,
}

impl<S: AccountStorage> Coordinator<S> {
    /// Create a coordinator with no transaction history
    pub fn new(store: Arc<S>, view: LogView) -> Self {
        Coordinator {
            store,
            sequencer: Arc::new(EventSequencer::new()),
            view,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Account store transactions read from and commit into
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// View mode given to every transaction's log
    pub fn view(&self) -> LogView {
        self.view
    }

    /// Shared event sequence counter
    pub fn sequencer(&self) -> &Arc<EventSequencer> {
        &self.sequencer
    }

    /// Open a transaction
    ///
    /// Assigns the next id and records the last validation number handed
    /// out as the snapshot number.
    pub fn open(&self) -> Transaction {
        let mut registry = self.registry.lock();
        registry.last_tid += 1;
        registry.started += 1;
        let tid = registry.last_tid;
        let snapshot_tnum = registry.last_tnum;
        registry.running.insert(tid, snapshot_tnum);
        drop(registry);

        debug!(target: "tally::occ", tid, snapshot_tnum, "Transaction opened");
        Transaction::new(tid, snapshot_tnum, Arc::clone(&self.sequencer), self.view)
    }

    /// Validate `txn` and, if it passes, install its writes
    ///
    /// Returns the terminal record, which is also retained in the committed
    /// or aborted registry. A failed validation is not an error; check
    /// [`Transaction::is_committed`] on the result.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if `txn` is not a running transaction of this
    ///   coordinator; nothing changes
    /// - `Internal` if the account store rejects a validated write. The
    ///   record is kept in the aborted registry with
    ///   [`AbortReason::InstallFailed`]; the store may be partially updated
    ///   and the process should stop.
    pub fn close(&self, mut txn: Transaction) -> Result<Arc<Transaction>> {
        let mut registry = self.registry.lock();
        registry.take_running(&txn)?;

        registry.last_tnum += 1;
        let tnum = registry.last_tnum;
        txn.begin_validation(tnum)?;
        txn.log(format!(
            "validating with tnum {}, snapshot tnum {}",
            tnum,
            txn.snapshot_tnum()
        ));

        let verdict = validate_backward(
            &txn,
            registry
                .committed
                .range(overlapping_range(txn.snapshot_tnum(), tnum))
                .map(|(_, committed)| committed.as_ref()),
        );

        match verdict {
            Ok(()) => {
                txn.log("validation passed");
                if let Err(e) = self.install(&mut txn) {
                    let reason = AbortReason::InstallFailed(e.to_string());
                    txn.log(format!("aborted: {}", reason));
                    txn.mark_aborted(reason)?;
                    registry.aborted.push(Arc::new(txn));
                    return Err(e);
                }
                txn.mark_committed()?;

                info!(
                    target: "tally::occ",
                    tid = txn.tid(),
                    tnum,
                    writes = txn.write_set().len(),
                    "Transaction committed"
                );
                let record = Arc::new(txn);
                registry.committed.insert(tnum, Arc::clone(&record));
                Ok(record)
            }
            Err(conflict) => {
                txn.log(format!("validation failed: {}", conflict));
                info!(
                    target: "tally::occ",
                    tid = conflict.tid,
                    tnum,
                    committed_tid = conflict.committed_tid,
                    account = conflict.account,
                    "Transaction aborted by validation"
                );
                txn.mark_aborted(AbortReason::Conflict(conflict))?;
                registry.validation_failures += 1;
                let record = Arc::new(txn);
                registry.aborted.push(Arc::clone(&record));
                Ok(record)
            }
        }
    }

    /// Abort a running transaction without validation
    ///
    /// The write set is discarded; the account store is not touched.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `txn` is not a running transaction of this
    /// coordinator.
    pub fn abort_client(&self, mut txn: Transaction, reason: AbortReason) -> Result<Arc<Transaction>> {
        let mut registry = self.registry.lock();
        registry.take_running(&txn)?;

        txn.log(format!("aborted: {}", reason));
        debug!(target: "tally::occ", tid = txn.tid(), reason = %reason, "Transaction aborted");
        txn.mark_aborted(reason)?;
        let record = Arc::new(txn);
        registry.aborted.push(Arc::clone(&record));
        Ok(record)
    }

    /// Every aborted transaction, in abort order
    pub fn aborted_transactions(&self) -> Vec<Arc<Transaction>> {
        self.registry.lock().aborted.clone()
    }

    /// Every committed transaction, in commit (tnum) order
    pub fn committed_transactions(&self) -> Vec<Arc<Transaction>> {
        self.registry.lock().committed.values().cloned().collect()
    }

    /// Ids of running transactions
    pub fn running_transactions(&self) -> Vec<TxnId> {
        self.registry.lock().running.keys().copied().collect()
    }

    /// Last validation number handed out (0 if none)
    pub fn last_tnum(&self) -> TxnNumber {
        self.registry.lock().last_tnum
    }

    /// Current counters
    pub fn stats(&self) -> CoordinatorStats {
        let registry = self.registry.lock();
        CoordinatorStats {
            running: registry.running.len() as u64,
            started: registry.started,
            committed: registry.committed.len() as u64,
            aborted: registry.aborted.len() as u64,
            validation_failures: registry.validation_failures,
        }
    }

    /// Update phase. Caller holds the registry lock.
    fn install(&self, txn: &mut Transaction) -> Result<()> {
        let writes: Vec<_> = txn.write_set().iter().map(|(a, b)| (*a, *b)).collect();
        for (account, balance) in writes {
            if let Err(e) = self.store.write(account, balance) {
                error!(
                    target: "tally::occ",
                    tid = txn.tid(),
                    account,
                    error = %e,
                    "Account store rejected a validated write"
                );
                return Err(Error::internal(format!(
                    "installing transaction #{} failed at account #{}: {}",
                    txn.tid(),
                    account,
                    e
                )));
            }
            txn.log(format!("wrote account #{} = {}", account, balance));
        }
        Ok(())
    }
}
