//! Account balances
//!
//! # Design
//!
//! - DashMap: sharded by default, reads and writes only lock the target shard
//! - Accounts are created up front; `write` never inserts
//!
//! Each single-key operation holds its shard lock for its whole duration,
//! which makes it linearizable with respect to every other single-key
//! operation on the same account.

use dashmap::DashMap;
use std::collections::BTreeMap;
use tally_core::{AccountId, AccountStorage, Balance, Error, Result};
use tracing::trace;

/// Committed account balances
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: DashMap<AccountId, Balance>,
}

impl AccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create accounts `0..count`, each holding `initial_balance`
    pub fn with_accounts(count: u64, initial_balance: Balance) -> Self {
        Self::from_balances((0..count).map(|id| (id, initial_balance)))
    }

    /// Create a store from explicit `(account, balance)` pairs
    ///
    /// Later pairs overwrite earlier ones with the same account id.
    pub fn from_balances<I>(balances: I) -> Self
    where
        I: IntoIterator<Item = (AccountId, Balance)>,
    {
        AccountStore {
            accounts: balances.into_iter().collect(),
        }
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if the store holds no accounts
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances
    ///
    /// Not atomic across accounts: concurrent writes may or may not be
    /// reflected. Call it on a quiescent store.
    pub fn total_balance(&self) -> i128 {
        self.accounts
            .iter()
            .map(|entry| i128::from(*entry.value()))
            .sum()
    }

    /// Ordered copy of every balance
    ///
    /// Same caveat as [`total_balance`](Self::total_balance).
    pub fn balances(&self) -> BTreeMap<AccountId, Balance> {
        self.accounts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

impl AccountStorage for AccountStore {
    fn read(&self, account: AccountId) -> Result<Balance> {
        self.accounts
            .get(&account)
            .map(|balance| *balance)
            .ok_or(Error::UnknownAccount(account))
    }

    fn write(&self, account: AccountId, balance: Balance) -> Result<()> {
        match self.accounts.get_mut(&account) {
            Some(mut slot) => {
                trace!(target: "tally::store", account, old = *slot, new = balance, "write");
                *slot = balance;
                Ok(())
            }
            None => Err(Error::UnknownAccount(account)),
        }
    }

    fn contains(&self, account: AccountId) -> bool {
        self.accounts.contains_key(&account)
    }
}
