//! Core traits for storage abstraction
//!
//! The OCC engine only ever touches committed balances through
//! [`AccountStorage`], so the store can be swapped without touching the
//! concurrency layer.

use crate::error::Result;
use crate::types::{AccountId, Balance};

/// Committed account balances
///
/// Thread safety: all methods may be called concurrently from many worker
/// threads. Each single-key `read` or `write` must be atomic with respect
/// to every other single-key operation. No multi-key atomicity is expected;
/// the coordinator provides that.
pub trait AccountStorage: Send + Sync {
    /// Current committed balance of `account`
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAccount`](crate::Error::UnknownAccount) if
    /// the account does not exist.
    fn read(&self, account: AccountId) -> Result<Balance>;

    /// Overwrite the committed balance of `account`
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAccount`](crate::Error::UnknownAccount) if
    /// the account does not exist. Accounts are never created by a write.
    fn write(&self, account: AccountId, balance: Balance) -> Result<()>;

    /// Whether `account` exists
    fn contains(&self, account: AccountId) -> bool;
}
