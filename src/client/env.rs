//! Configuration from environment variables
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `DB_HOST` | yes | |
//! | `DB_PORT` | no | 3306 |
//! | `DB_USER` | yes | |
//! | `DB_PASSWORD` | yes (may be empty) | |
//! | `DB_DATABASE` | yes | |
//! | `DB_SOCKET` | no | TCP |
//! | `DB_SSLMODE` | no | `disable` |
//! | `DB_SSL_CA` | no | system roots |
//! | `DB_CONNECT_TIMEOUT` | no | 10 (seconds) |
//! | `DB_QUERY_TIMEOUT` | no | none (seconds) |
//! | `DB_APPLICATION_NAME` | no | |

use crate::connection::{ConnectionConfig, SslMode, DEFAULT_PORT};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable names
pub mod vars {
    /// Server hostname
    pub const HOST: &str = "DB_HOST";
    /// Server port
    pub const PORT: &str = "DB_PORT";
    /// Login user
    pub const USER: &str = "DB_USER";
    /// Login password
    pub const PASSWORD: &str = "DB_PASSWORD";
    /// Initial database
    pub const DATABASE: &str = "DB_DATABASE";
    /// Unix socket path
    pub const SOCKET: &str = "DB_SOCKET";
    /// TLS mode
    pub const SSLMODE: &str = "DB_SSLMODE";
    /// CA certificate path
    pub const SSL_CA: &str = "DB_SSL_CA";
    /// Connect timeout in seconds
    pub const CONNECT_TIMEOUT: &str = "DB_CONNECT_TIMEOUT";
    /// Query timeout in seconds
    pub const QUERY_TIMEOUT: &str = "DB_QUERY_TIMEOUT";
    /// Application name
    pub const APPLICATION_NAME: &str = "DB_APPLICATION_NAME";
}

/// Load the connection configuration from the process environment
///
/// Fails with [`Error::Config`] naming every missing variable. No connection
/// is attempted.
pub fn load_configuration() -> Result<ConnectionConfig> {
    ConnectionConfig::from_env()
}

impl ConnectionConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a `.env` file, with the process environment taking precedence
    ///
    /// The process environment is only read, never modified.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_env_file_with(path.as_ref(), |key| std::env::var(key).ok())
    }

    /// Load from a `.env` file layered under `process`
    ///
    /// An empty process value does not hide the file's value, except for
    /// `DB_PASSWORD` where empty is a valid setting.
    fn from_env_file_with<F>(path: &Path, process: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = read_env_file(path)?;
        Self::from_lookup(|key| {
            process(key)
                .filter(|v| key == vars::PASSWORD || !v.is_empty())
                .or_else(|| file.get(key).cloned())
        })
    }

    /// Load from an arbitrary key lookup
    ///
    /// Used by [`ConnectionConfig::from_env`]; handy in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty strings count as unset, except for the password
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let host = get(vars::HOST);
        let user = get(vars::USER);
        let password = lookup(vars::PASSWORD);
        let database = get(vars::DATABASE);

        let missing: Vec<&str> = [
            (vars::HOST, host.is_none()),
            (vars::USER, user.is_none()),
            (vars::PASSWORD, password.is_none()),
            (vars::DATABASE, database.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect();

        let (Some(host), Some(user), Some(password), Some(database)) =
            (host, user, password, database)
        else {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let port = match get(vars::PORT) {
            Some(value) => value.trim().parse::<u16>().map_err(|_| {
                Error::Config(format!(
                    "invalid {} '{}': expected a port number",
                    vars::PORT,
                    value
                ))
            })?,
            None => DEFAULT_PORT,
        };

        let mut builder = ConnectionConfig::builder(host, user, database)
            .port(port)
            .password(password);

        if let Some(socket) = get(vars::SOCKET) {
            builder = builder.socket(socket);
        }
        if let Some(mode) = get(vars::SSLMODE) {
            builder = builder.sslmode(mode.parse::<SslMode>()?);
        }
        if let Some(ca) = get(vars::SSL_CA) {
            builder = builder.ssl_ca(ca);
        }
        if let Some(value) = get(vars::CONNECT_TIMEOUT) {
            builder = builder.connect_timeout(parse_seconds(vars::CONNECT_TIMEOUT, &value)?);
        }
        if let Some(value) = get(vars::QUERY_TIMEOUT) {
            builder = builder.query_timeout(parse_seconds(vars::QUERY_TIMEOUT, &value)?);
        }
        if let Some(name) = get(vars::APPLICATION_NAME) {
            builder = builder.application_name(name);
        }

        Ok(builder.build())
    }
}

/// Positive whole seconds, shared by the env and connection-string loaders
pub(super) fn parse_seconds(var: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "invalid {} '{}': expected a positive number of seconds",
            var, value
        ))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        Error::Config(format!("failed to read env file '{}': {}", path.display(), e))
    })?;

    iter.map(|item| {
        item.map_err(|e| {
            Error::Config(format!("failed to parse env file '{}': {}", path.display(), e))
        })
    })
    .collect()
}
