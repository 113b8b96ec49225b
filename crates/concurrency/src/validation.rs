//! Backward validation for OCC
//!
//! A transaction `t` overlaps every transaction `u` that received its
//! validation number after `t` opened and before `t` entered validation,
//! i.e. `t.snapshot_tnum < u.tnum < t.tnum`. Validation fails if any
//! committed overlapping `u` wrote an account that `t` read.
//!
//! Key rules:
//! - Only the read set of the validating transaction is checked
//! - Write/write overlap is not a conflict; the later committer wins
//! - Numbers whose holder aborted leave gaps in the committed history;
//!   gaps are skipped

use crate::transaction::Transaction;
use std::fmt;
use std::ops::Range;
use tally_core::{AccountId, TxnId, TxnNumber};

/// Read/write conflict found by backward validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Transaction that failed validation
    pub tid: TxnId,
    /// Committed transaction it conflicts with
    pub committed_tid: TxnId,
    /// Validation number of the committed transaction
    pub committed_tnum: TxnNumber,
    /// Smallest account read by `tid` and written by `committed_tid`
    pub account: AccountId,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction #{} read account #{} written by committed transaction #{} (tnum {})",
            self.tid, self.account, self.committed_tid, self.committed_tnum
        )
    }
}

/// Validation numbers that overlap a transaction opened at `snapshot_tnum`
/// and validating as `tnum`: the open interval `(snapshot_tnum, tnum)`
pub fn overlapping_range(snapshot_tnum: TxnNumber, tnum: TxnNumber) -> Range<TxnNumber> {
    let start = snapshot_tnum.saturating_add(1);
    let end = tnum.max(start);
    start..end
}

/// Check `txn`'s read set against the write sets of `overlapping`
///
/// `overlapping` must yield the committed transactions numbered in
/// [`overlapping_range`] in ascending number order; absent numbers are
/// simply not yielded. The first conflict found is returned.
pub fn validate_backward<'a, I>(txn: &Transaction, overlapping: I) -> Result<(), Conflict>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    if txn.read_set().is_empty() {
        return Ok(());
    }

    for committed in overlapping {
        let written = committed.write_set();
        if let Some(account) = txn.read_set().iter().find(|a| written.contains_key(a)) {
            return Err(Conflict {
                tid: txn.tid(),
                committed_tid: committed.tid(),
                committed_tnum: committed.tnum().unwrap_or_default(),
                account: *account,
            });
        }
    }

    Ok(())
}
