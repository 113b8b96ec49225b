//! Core types and traits for Tally
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifier aliases: AccountId, Balance, TxnId, TxnNumber
//! - Error: Error type shared by every layer
//! - Traits: AccountStorage, the seam between the OCC engine and the store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::AccountStorage;
pub use types::{AccountId, Balance, TxnId, TxnNumber};
