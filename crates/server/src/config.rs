//! Server configuration via `tally.toml`
//!
//! Every field is optional; missing fields take their defaults. Command-line
//! flags are applied on top of the loaded file (see [`crate::cli`]).

use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_concurrency::LogView;
use tally_core::{Balance, Error, Result};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "tally.toml";

/// Server configuration
///
/// # Example
///
/// ```toml
/// host = "0.0.0.0"
/// port = 23456
/// accounts = 100
/// initial_balance = 1000
/// view = "deferred"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to listen on
    pub host: String,
    /// TCP port to listen on (0 picks a free port)
    pub port: u16,
    /// Number of accounts, numbered `0..accounts`
    pub accounts: u64,
    /// Starting balance of every account
    pub initial_balance: Balance,
    /// When transaction events are logged
    pub view: LogView,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 23456,
            accounts: 10,
            initial_balance: 10,
            view: LogView::Live,
        }
    }
}

impl ServerConfig {
    /// `host:port` string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.accounts == 0 {
            return Err(Error::Config("accounts must be at least 1".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tally server configuration

# Interface and port to listen on
host = "127.0.0.1"
port = 23456

# Accounts are numbered 0..accounts, each starting at initial_balance
accounts = 10
initial_balance = 10

# Transaction log view: "live" logs every event as it happens,
# "deferred" logs a transaction's events together once it ends
view = "live"
"#
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ServerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config: ServerConfig = toml::from_str(ServerConfig::default_toml()).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: ServerConfig = toml::from_str("accounts = 3").unwrap();
        assert_eq!(config.accounts, 3);
        assert_eq!(config.port, 23456);
        assert_eq!(config.view, LogView::Live);
    }

    #[test]
    fn parse_deferred_view() {
        let config: ServerConfig = toml::from_str("view = \"deferred\"").unwrap();
        assert_eq!(config.view, LogView::Deferred);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(toml::from_str::<ServerConfig>("acounts = 3").is_err());
    }

    #[test]
    fn zero_accounts_invalid() {
        let config = ServerConfig {
            accounts: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "port = 4000\ninitial_balance = -5\n").unwrap();
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.initial_balance, -5);

        std::fs::write(&path, "accounts = 0\n").unwrap();
        assert!(ServerConfig::from_file(&path).is_err());
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ServerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
