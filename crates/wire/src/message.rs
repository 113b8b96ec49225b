//! Request/Response messages of the Tally protocol
//!
//! A client session is a sequence of requests, each answered by at most one
//! response:
//!
//! | Request              | Response on success       |
//! |----------------------|---------------------------|
//! | `OpenTransaction`    | `Opened { tid }`          |
//! | `Read`               | `ReadOk { balance }`      |
//! | `Write`              | `WriteOk { previous }`    |
//! | `CloseTransaction`   | `Committed` / `Aborted`   |
//! | `AbortTransaction`   | none, connection closed   |
//! | `Shutdown`           | none, connection closed   |
//!
//! A read or write of an unknown account is answered with `Failed` and the
//! transaction keeps running.

use serde::{Deserialize, Serialize};
use tally_core::{AccountId, Balance, Error, TxnId};

/// Client to server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Start a new transaction
    OpenTransaction,
    /// Read the balance of an account
    Read {
        /// Account to read
        account: AccountId,
    },
    /// Tentatively set the balance of an account
    Write {
        /// Account to write
        account: AccountId,
        /// New balance
        balance: Balance,
    },
    /// Validate and, if it passes, commit the transaction
    CloseTransaction,
    /// Discard the transaction and end the session
    AbortTransaction,
    /// Stop the server
    Shutdown,
}

impl Request {
    /// Message name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::OpenTransaction => "OPEN_TRANSACTION",
            Request::Read { .. } => "READ_REQUEST",
            Request::Write { .. } => "WRITE_REQUEST",
            Request::CloseTransaction => "CLOSE_TRANSACTION",
            Request::AbortTransaction => "ABORT_TRANSACTION",
            Request::Shutdown => "SHUTDOWN",
        }
    }
}

/// Server to client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Transaction opened
    Opened {
        /// Identifier assigned to the transaction
        tid: TxnId,
    },
    /// Balance observed by a read
    ReadOk {
        /// Balance visible to the transaction
        balance: Balance,
    },
    /// Write recorded in the transaction's write set
    WriteOk {
        /// Balance visible to the transaction before this write
        previous: Balance,
    },
    /// Validation passed and the write set is installed
    Committed,
    /// Validation failed; nothing was installed
    Aborted,
    /// The request failed; the transaction is still running
    Failed {
        /// Machine-readable failure code (see [`error_code`])
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl Response {
    /// Build a `Failed` response from an error
    pub fn failed(err: &Error) -> Self {
        Response::Failed {
            code: error_code(err).to_string(),
            message: err.to_string(),
        }
    }
}

/// Stable failure code reported to clients for an error
pub fn error_code(err: &Error) -> &'static str {
    match err {
        Error::UnknownAccount(_) => "UnknownAccount",
        Error::InvalidState(_) => "InvalidState",
        Error::Protocol(_) => "Protocol",
        Error::Io(_) => "Io",
        Error::Serialization(_) => "Serialization",
        Error::Config(_) => "Config",
        Error::Remote { .. } => "Remote",
        Error::Internal(_) => "Internal",
    }
}
