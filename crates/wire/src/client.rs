//! Blocking client proxy
//!
//! A `Client` owns one connection and drives one transaction over it.
//! Closing, aborting and shutting down consume the client, since the
//! server ends the session after each of them.

use crate::channel::TcpChannel;
use crate::message::{Request, Response};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use tally_core::{AccountId, Balance, Error, Result, TxnId};
use tracing::debug;

/// Result of closing a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Validation passed; the writes are installed
    Committed,
    /// Validation failed; nothing was installed
    Aborted,
}

/// Client connection to a Tally server
#[derive(Debug)]
pub struct Client {
    channel: TcpChannel,
    tid: Option<TxnId>,
}

impl Client {
    /// Connect to a server
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            channel: TcpChannel::from_tcp(stream)?,
            tid: None,
        })
    }

    /// Identifier of the open transaction, if any
    pub fn tid(&self) -> Option<TxnId> {
        self.tid
    }

    /// Open a transaction
    pub fn open(&mut self) -> Result<TxnId> {
        match self.call(&Request::OpenTransaction)? {
            Response::Opened { tid } => {
                self.tid = Some(tid);
                Ok(tid)
            }
            other => Err(unexpected("Opened", other)),
        }
    }

    /// Read an account's balance as seen by the open transaction
    pub fn read(&mut self, account: AccountId) -> Result<Balance> {
        match self.call(&Request::Read { account })? {
            Response::ReadOk { balance } => Ok(balance),
            Response::Failed { code, message } => Err(remote_error(account, code, message)),
            other => Err(unexpected("ReadOk", other)),
        }
    }

    /// Tentatively write an account, returning the balance it replaced
    pub fn write(&mut self, account: AccountId, balance: Balance) -> Result<Balance> {
        match self.call(&Request::Write { account, balance })? {
            Response::WriteOk { previous } => Ok(previous),
            Response::Failed { code, message } => Err(remote_error(account, code, message)),
            other => Err(unexpected("WriteOk", other)),
        }
    }

    /// Close the transaction and wait for the validation outcome
    pub fn close(mut self) -> Result<CloseOutcome> {
        match self.call(&Request::CloseTransaction)? {
            Response::Committed => Ok(CloseOutcome::Committed),
            Response::Aborted => Ok(CloseOutcome::Aborted),
            other => Err(unexpected("Committed or Aborted", other)),
        }
    }

    /// Abort the transaction; the server closes the connection
    pub fn abort(mut self) -> Result<()> {
        self.channel.send_message(&Request::AbortTransaction)
    }

    /// Ask the server to stop
    pub fn shutdown(mut self) -> Result<()> {
        self.channel.send_message(&Request::Shutdown)
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        debug!(target: "tally::client", tid = ?self.tid, request = request.name(), "sending");
        self.channel.send_message(request)?;
        self.channel.recv_message()?.ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("server closed connection after {}", request.name()),
            ))
        })
    }
}

fn remote_error(account: AccountId, code: String, message: String) -> Error {
    if code == "UnknownAccount" {
        Error::UnknownAccount(account)
    } else {
        Error::Remote { code, message }
    }
}

fn unexpected(expected: &str, got: Response) -> Error {
    Error::protocol(format!("expected {}, got {:?}", expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_account_code_maps_to_typed_error() {
        let err = remote_error(12, "UnknownAccount".into(), "unknown account: 12".into());
        assert!(matches!(err, Error::UnknownAccount(12)));
    }

    #[test]
    fn test_other_codes_stay_remote() {
        let err = remote_error(1, "Internal".into(), "boom".into());
        assert!(matches!(err, Error::Remote { ref code, .. } if code == "Internal"));
    }

    #[test]
    fn test_unexpected_response_is_protocol_error() {
        let err = unexpected("Opened", Response::Committed);
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("Committed"));
    }
}
