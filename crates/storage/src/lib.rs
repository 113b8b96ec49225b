//! Storage layer for Tally
//!
//! This crate implements the committed account balances:
//! - AccountStore: DashMap-backed map from account id to balance
//!
//! The store knows nothing about transactions. Per-key reads and writes
//! are atomic; multi-key atomicity is the concurrency layer's job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accounts;

pub use accounts::AccountStore;
