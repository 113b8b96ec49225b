//! Tally - transactional account server with optimistic concurrency control
//!
//! Clients open transactions over TCP, read and write integer account
//! balances, then ask to commit. The server validates each closing
//! transaction against the transactions that committed while it ran
//! (backward validation) and either installs all of its writes or none.
//!
//! # Quick Start
//!
//! ```ignore
//! use tally::{Client, CloseOutcome, Server, ServerConfig};
//!
//! let server = Server::bind(&ServerConfig::default())?;
//! let addr = server.local_addr()?;
//! std::thread::spawn(move || server.run());
//!
//! let mut client = Client::connect(addr)?;
//! client.open()?;
//! let balance = client.read(0)?;
//! client.write(0, balance + 5)?;
//! assert_eq!(client.close()?, CloseOutcome::Committed);
//! ```
//!
//! # Architecture
//!
//! - `tally-core`: error type, id aliases, the account storage trait
//! - `tally-storage`: concurrent in-memory account store
//! - `tally-concurrency`: transaction records, validation, coordinator
//! - `tally-wire`: messages, framing, client proxy
//! - `tally-server`: sessions, accept loop, config, binary

pub use tally_concurrency::{
    AbortReason, Conflict, Coordinator, CoordinatorStats, LogView, Transaction,
    TransactionStatus,
};
pub use tally_core::{AccountId, AccountStorage, Balance, Error, Result, TxnId, TxnNumber};
pub use tally_server::{Server, ServerConfig, Session, SessionEnd, ShutdownSignal};
pub use tally_storage::AccountStore;
pub use tally_wire::{Client, CloseOutcome, Request, Response};
