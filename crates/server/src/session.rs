//! Worker session
//!
//! A session serves one client connection and drives at most one
//! transaction through it:
//!
//! | Request              | Requires                | Effect                      | Reply                 |
//! |----------------------|-------------------------|-----------------------------|-----------------------|
//! | `OpenTransaction`    | no transaction yet      | `coordinator.open()`        | `Opened`              |
//! | `Read`               | running transaction     | `txn.read(k)`               | `ReadOk` / `Failed`   |
//! | `Write`              | running transaction     | `txn.write(k, v)`           | `WriteOk` / `Failed`  |
//! | `CloseTransaction`   | running transaction     | `coordinator.close(txn)`    | `Committed`/`Aborted` |
//! | `AbortTransaction`   | running transaction     | `coordinator.abort_client`  | none                  |
//! | `Shutdown`           | anything                | abort, stop the server      | none                  |
//!
//! The session ends after close, abort or shutdown, when the client goes
//! away, or on the first request that breaks the table above. Whenever it
//! ends with a transaction still running, that transaction is aborted.

use std::sync::Arc;
use tally_concurrency::{AbortReason, Coordinator, LogView, Transaction};
use tally_core::{AccountStorage, Error, Result};
use tally_wire::{Request, Response, Transport};
use tracing::{debug, error, info, warn};

use crate::shutdown::ShutdownSignal;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Transaction closed and committed
    Committed,
    /// Transaction closed and failed validation
    Aborted,
    /// Client sent `AbortTransaction`
    ClientAborted,
    /// Client went away
    Disconnected,
    /// Client broke the protocol
    ProtocolViolation,
    /// Client requested server shutdown
    Shutdown,
}

/// One client connection
pub struct Session<S, T> {
    id: u64,
    coordinator: Arc<Coordinator<S>>,
    transport: T,
    shutdown: ShutdownSignal,
    txn: Option<Transaction>,
}

impl<S: AccountStorage, T: Transport> Session<S, T> {
    /// Create a session over `transport`
    pub fn new(
        id: u64,
        coordinator: Arc<Coordinator<S>>,
        transport: T,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            coordinator,
            transport,
            shutdown,
            txn: None,
        }
    }

    /// Serve requests until the session ends
    ///
    /// # Errors
    ///
    /// Only process-fatal errors are returned (see
    /// [`Error::is_process_fatal`]); the caller should stop the server.
    /// Everything else ends the session with a [`SessionEnd`].
    pub fn run(mut self) -> Result<SessionEnd> {
        loop {
            let step = match self.transport.recv() {
                Ok(Some(request)) => {
                    debug!(target: "tally::server", session = self.id, request = request.name(), "Request");
                    self.handle(request)
                }
                Ok(None) => {
                    debug!(target: "tally::server", session = self.id, "Client closed connection");
                    return self.end(AbortReason::Disconnected, SessionEnd::Disconnected);
                }
                Err(e) => Err(e),
            };

            match step {
                Ok(None) => {}
                Ok(Some(end)) => return Ok(end),
                Err(e) if e.is_process_fatal() => {
                    error!(target: "tally::server", session = self.id, error = %e, "Fatal error");
                    return Err(e);
                }
                Err(Error::Protocol(msg)) | Err(Error::InvalidState(msg)) => {
                    warn!(target: "tally::server", session = self.id, "Protocol violation: {}", msg);
                    return self.end(
                        AbortReason::ProtocolViolation(msg),
                        SessionEnd::ProtocolViolation,
                    );
                }
                Err(e) => {
                    warn!(target: "tally::server", session = self.id, error = %e, "Connection lost");
                    return self.end(AbortReason::Disconnected, SessionEnd::Disconnected);
                }
            }
        }
    }

    /// Handle one request; `Some` ends the session
    fn handle(&mut self, request: Request) -> Result<Option<SessionEnd>> {
        match request {
            Request::OpenTransaction => {
                if let Some(txn) = &self.txn {
                    return Err(Error::protocol(format!(
                        "OPEN_TRANSACTION while transaction #{} is running",
                        txn.tid()
                    )));
                }
                let mut txn = self.coordinator.open();
                txn.log(format!("opened, snapshot tnum {}", txn.snapshot_tnum()));
                let tid = txn.tid();
                self.txn = Some(txn);
                self.transport.send(&Response::Opened { tid })?;
                Ok(None)
            }

            Request::Read { account } => {
                let txn = running(&mut self.txn, "READ_REQUEST")?;
                let response = match txn.read(self.coordinator.store().as_ref(), account) {
                    Ok(balance) => {
                        txn.log(format!("read account #{} = {}", account, balance));
                        Response::ReadOk { balance }
                    }
                    Err(e) if e.is_store_error() => {
                        txn.log(format!("read account #{} failed: {}", account, e));
                        Response::failed(&e)
                    }
                    Err(e) => return Err(e),
                };
                self.transport.send(&response)?;
                Ok(None)
            }

            Request::Write { account, balance } => {
                let txn = running(&mut self.txn, "WRITE_REQUEST")?;
                let response = match txn.write(self.coordinator.store().as_ref(), account, balance)
                {
                    Ok(previous) => {
                        txn.log(format!(
                            "write account #{} = {} (was {})",
                            account, balance, previous
                        ));
                        Response::WriteOk { previous }
                    }
                    Err(e) if e.is_store_error() => {
                        txn.log(format!("write account #{} failed: {}", account, e));
                        Response::failed(&e)
                    }
                    Err(e) => return Err(e),
                };
                self.transport.send(&response)?;
                Ok(None)
            }

            Request::CloseTransaction => {
                let txn = self.txn.take().ok_or_else(|| {
                    Error::protocol("CLOSE_TRANSACTION before OPEN_TRANSACTION")
                })?;
                let record = self.coordinator.close(txn)?;
                self.report(&record);

                let (response, end) = if record.is_committed() {
                    (Response::Committed, SessionEnd::Committed)
                } else {
                    (Response::Aborted, SessionEnd::Aborted)
                };
                // the outcome stands even if the client is gone
                if let Err(e) = self.transport.send(&response) {
                    warn!(target: "tally::server", session = self.id, error = %e, "Could not deliver close outcome");
                }
                Ok(Some(end))
            }

            Request::AbortTransaction => {
                running(&mut self.txn, "ABORT_TRANSACTION")?;
                self.end(AbortReason::ClientRequested, SessionEnd::ClientAborted)
                    .map(Some)
            }

            Request::Shutdown => {
                let end = self.end(AbortReason::Shutdown, SessionEnd::Shutdown)?;
                self.shutdown.trigger();
                Ok(Some(end))
            }
        }
    }

    /// Abort the running transaction, if any, and end the session
    fn end(&mut self, reason: AbortReason, end: SessionEnd) -> Result<SessionEnd> {
        if let Some(txn) = self.txn.take() {
            let record = self.coordinator.abort_client(txn, reason)?;
            self.report(&record);
        }
        Ok(end)
    }

    fn report(&self, record: &Transaction) {
        if self.coordinator.view() == LogView::Deferred {
            info!(target: "tally::txn", tid = record.tid(), "{}", record.render_log());
        }
        debug!(
            target: "tally::server",
            session = self.id,
            tid = record.tid(),
            status = record.status().name(),
            elapsed_us = record.elapsed().as_micros() as u64,
            "Transaction finished"
        );
    }
}

fn running<'a>(txn: &'a mut Option<Transaction>, request: &str) -> Result<&'a mut Transaction> {
    txn.as_mut()
        .ok_or_else(|| Error::protocol(format!("{} before OPEN_TRANSACTION", request)))
}
