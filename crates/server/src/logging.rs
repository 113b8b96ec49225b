//! Tracing subscriber setup for the server binary

use tally_core::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when neither `--log-level` nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "info";

/// Install the global fmt subscriber
///
/// `level` is an `EnvFilter` directive such as `debug` or
/// `tally::occ=debug,info`. Without it `RUST_LOG` is consulted, then
/// [`DEFAULT_FILTER`].
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = build_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install subscriber: {}", e)))
}

fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| Error::Config(format!("invalid log level '{}': {}", directives, e))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}
