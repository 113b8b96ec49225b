//! `tally-server`: serve an in-memory account store over TCP.

use std::process;

use tally_server::cli::{build_cli, config_from_matches, log_level};
use tally_server::logging::init_tracing;
use tally_server::Server;
use tracing::error;

fn main() {
    let matches = build_cli().get_matches();

    if let Err(e) = init_tracing(log_level(&matches)) {
        eprintln!("{}", e);
        process::exit(2);
    }

    let config = match config_from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!(target: "tally::server", "{}", e);
            process::exit(2);
        }
    };

    let server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            error!(target: "tally::server", addr = %config.bind_addr(), "Failed to start: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!(target: "tally::server", "{}", e);
        process::exit(1);
    }
}
