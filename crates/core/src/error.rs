//! Error types for Tally
//!
//! This module defines the error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into three scopes:
//! - operation scope: [`Error::UnknownAccount`] fails the current request only
//! - session scope: [`Error::Protocol`], [`Error::InvalidState`], [`Error::Io`]
//!   end the client session and abort its transaction
//! - process scope: [`Error::Internal`] stops the server
//!
//! A failed OCC validation is not an error; it is an ordinary outcome of
//! closing a transaction.

use crate::types::AccountId;
use std::io;
use thiserror::Error;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tally
#[derive(Debug, Error)]
pub enum Error {
    /// Account does not exist in the store
    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    /// Operation not allowed in the current transaction or session state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or out-of-sequence message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error (network, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Operation failed on the server, as reported to a client
    #[error("remote error [{code}]: {message}")]
    Remote {
        /// Machine-readable failure code
        code: String,
        /// Human-readable message
        message: String,
    },

    /// Invariant violated; the process should stop
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Errors raised by the account store. These fail one request and
    /// leave the transaction running.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::UnknownAccount(_))
    }

    /// Errors after which the session cannot continue
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::InvalidState(_) | Error::Io(_) | Error::Serialization(_)
        )
    }

    /// Errors after which the server must stop
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_account() {
        let err = Error::UnknownAccount(42);
        let msg = err.to_string();
        assert!(msg.contains("unknown account"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_error_display_remote() {
        let err = Error::Remote {
            code: "UnknownAccount".to_string(),
            message: "unknown account: 7".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("UnknownAccount"));
        assert!(msg.contains("7"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "peer went away");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_error_scopes_are_disjoint() {
        let errors = [
            Error::UnknownAccount(1),
            Error::invalid_state("x"),
            Error::protocol("x"),
            Error::Serialization("x".into()),
            Error::internal("x"),
        ];
        for err in &errors {
            let scopes = [
                err.is_store_error(),
                err.is_session_fatal(),
                err.is_process_fatal(),
            ];
            assert_eq!(scopes.iter().filter(|s| **s).count(), 1, "{err}");
        }
    }
}
