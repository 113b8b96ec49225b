//! TCP accept loop
//!
//! One named OS thread per accepted connection, each running a
//! [`Session`] against the shared coordinator. The loop exits once the
//! [`ShutdownSignal`] fires; sessions already in flight run to completion
//! on their own threads.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tally_concurrency::{Coordinator, LogView};
use tally_core::{Error, Result};
use tally_storage::AccountStore;
use tally_wire::TcpChannel;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::session::Session;
use crate::shutdown::ShutdownSignal;

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Tally server
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator<AccountStore>>,
    shutdown: ShutdownSignal,
}

impl Server {
    /// Bind the configured address and set up a fresh account store
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr())?;
        let store = AccountStore::with_accounts(config.accounts, config.initial_balance);
        Self::with_listener(listener, store, config.view)
    }

    /// Serve an existing store on an already bound listener
    pub fn with_listener(listener: TcpListener, store: AccountStore, view: LogView) -> Result<Self> {
        let shutdown = ShutdownSignal::for_listener(listener.local_addr()?);
        info!(
            target: "tally::server",
            accounts = store.len(),
            total = %store.total_balance(),
            view = %view,
            "Account store ready"
        );
        Ok(Self {
            listener,
            coordinator: Arc::new(Coordinator::new(Arc::new(store), view)),
            shutdown,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared coordinator
    pub fn coordinator(&self) -> &Arc<Coordinator<AccountStore>> {
        &self.coordinator
    }

    /// Handle that stops the accept loop
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown
    pub fn run(self) -> Result<()> {
        info!(target: "tally::server", addr = %self.local_addr()?, "Listening");

        let mut next_session: u64 = 0;
        for stream in self.listener.incoming() {
            if self.shutdown.is_triggered() {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    back_off_after_accept_error(&e);
                    continue;
                }
            };

            next_session += 1;
            let id = next_session;
            let coordinator = Arc::clone(&self.coordinator);
            let shutdown = self.shutdown.clone();
            thread::Builder::new()
                .name(format!("tally-worker-{}", id))
                .spawn(move || serve_connection(id, stream, coordinator, shutdown))
                .map_err(|e| Error::internal(format!("failed to spawn worker: {}", e)))?;
        }

        let stats = self.coordinator.stats();
        info!(
            target: "tally::server",
            started = stats.started,
            committed = stats.committed,
            aborted = stats.aborted,
            running = stats.running,
            "Server stopped"
        );
        Ok(())
    }
}

/// Errors like EMFILE persist until a connection closes, so retrying at
/// once would spin.
fn back_off_after_accept_error(e: &io::Error) {
    warn!(target: "tally::server", error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "Accept failed");
    thread::sleep(ACCEPT_BACKOFF);
}

fn serve_connection(
    id: u64,
    stream: TcpStream,
    coordinator: Arc<Coordinator<AccountStore>>,
    shutdown: ShutdownSignal,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(target: "tally::server", session = id, error = %e, "set_nodelay failed");
    }
    let channel = match TcpChannel::from_tcp(stream) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(target: "tally::server", session = id, error = %e, "Could not set up connection");
            return;
        }
    };
    let peer = channel.peer_addr().ok();
    debug!(target: "tally::server", session = id, peer = ?peer, "Session started");

    match Session::new(id, coordinator, channel, shutdown.clone()).run() {
        Ok(end) => debug!(target: "tally::server", session = id, end = ?end, "Session ended"),
        Err(e) => {
            error!(target: "tally::server", session = id, error = %e, "Stopping server after fatal error");
            shutdown.trigger();
        }
    }
}
