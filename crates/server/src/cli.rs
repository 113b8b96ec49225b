//! Clap command definition for `tally-server`
//!
//! Flags override values loaded from `--config`, which override defaults.

use clap::{Arg, ArgMatches, Command};
use std::path::Path;
use tally_concurrency::LogView;
use tally_core::{Balance, Error, Result};

use crate::config::ServerConfig;

/// Build the command-line interface
pub fn build_cli() -> Command {
    Command::new("tally-server")
        .about("Transactional account server with optimistic concurrency control")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML config file"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .help("Interface to listen on (default: 127.0.0.1)"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16))
                .help("TCP port (default: 23456)"),
        )
        .arg(
            Arg::new("accounts")
                .long("accounts")
                .value_parser(clap::value_parser!(u64))
                .help("Number of accounts (default: 10)"),
        )
        .arg(
            Arg::new("initial-balance")
                .long("initial-balance")
                .value_parser(clap::value_parser!(Balance))
                .allow_negative_numbers(true)
                .help("Starting balance of every account (default: 10)"),
        )
        .arg(
            Arg::new("view")
                .long("view")
                .value_parser(["live", "deferred"])
                .help("Log transaction events live or when each transaction ends"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Tracing filter, e.g. `debug` or `tally::occ=debug,info` (default: $RUST_LOG or info)"),
        )
}

/// Resolve the effective configuration from parsed arguments
pub fn config_from_matches(matches: &ArgMatches) -> Result<ServerConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ServerConfig::from_file(Path::new(path))?,
        None => ServerConfig::default(),
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(accounts) = matches.get_one::<u64>("accounts") {
        config.accounts = *accounts;
    }
    if let Some(balance) = matches.get_one::<Balance>("initial-balance") {
        config.initial_balance = *balance;
    }
    if let Some(view) = matches.get_one::<String>("view") {
        config.view = view.parse::<LogView>()?;
    }

    config.validate()?;
    Ok(config)
}

/// `--log-level`, if given
pub fn log_level(matches: &ArgMatches) -> Option<&str> {
    matches.get_one::<String>("log-level").map(String::as_str)
}

/// Parse `args`, reporting clap errors as config errors
pub fn parse_args<I, T>(args: I) -> Result<ArgMatches>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    build_cli()
        .try_get_matches_from(args)
        .map_err(|e| Error::Config(e.to_string()))
}
