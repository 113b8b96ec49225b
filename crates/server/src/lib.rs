//! Tally server
//!
//! - `config`: `tally.toml` settings
//! - `session`: per-connection request loop
//! - `server`: accept loop and worker threads
//! - `shutdown`: process-wide stop flag
//! - `cli` / `logging`: binary support

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::Server;
pub use session::{Session, SessionEnd};
pub use shutdown::ShutdownSignal;
