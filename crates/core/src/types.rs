//! Identifier and value types
//!
//! Accounts are addressed by non-negative integers and hold signed
//! integer balances. Transactions carry two numbers: the `TxnId` assigned
//! at open and the `TxnNumber` assigned when validation starts.

/// Account identifier (non-negative)
pub type AccountId = u64;

/// Account balance
pub type Balance = i64;

/// Transaction identity, assigned at open. The first transaction gets 1.
pub type TxnId = u64;

/// Validation number, assigned at validation entry. Defines commit order.
///
/// 0 is never assigned; a snapshot number of 0 means no transaction had
/// entered validation yet.
pub type TxnNumber = u64;
