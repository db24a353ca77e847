//! Connection configuration

use super::tls::{SslMode, TlsConfig};
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 3306;

/// Connect timeout used when none is configured
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration
///
/// An immutable record of where and as whom to connect. Build one with
/// [`ConnectionConfig::builder`], or load it with
/// [`crate::load_configuration`], [`ConnectionConfig::from_env_file`] or
/// [`ConnectionConfig::from_url`].
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server hostname or IP address
    pub host: String,
    /// Server port (default: 3306)
    pub port: u16,
    /// Username
    pub user: String,
    /// Password (may be empty)
    pub password: String,
    /// Initial database
    pub database: String,
    /// Unix socket path; when set, `host` and `port` are not used
    pub socket: Option<PathBuf>,
    /// SSL/TLS mode
    pub sslmode: SslMode,
    /// CA certificate (PEM) for `verify-ca` / `verify-full`
    pub ssl_ca: Option<String>,
    /// Deadline for connect + handshake + authentication (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Deadline for each query (default: none)
    pub query_timeout: Option<Duration>,
    /// Reported to the server as the `program_name` connection attribute
    pub application_name: Option<String>,
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    ///
    /// # Defaults
    ///
    /// - `port`: 3306
    /// - `sslmode`: disable
    /// - `connect_timeout`: 10 seconds
    /// - `query_timeout`: None
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::builder(host, user, database).password(password).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder("192.168.1.72", "tye", "mydata")
    ///     .password("1234")
    ///     .connect_timeout(Duration::from_secs(5))
    ///     .sslmode(SslMode::Require)
    ///     .build();
    /// ```
    pub fn builder(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: String::new(),
            database: database.into(),
            socket: None,
            sslmode: SslMode::default(),
            ssl_ca: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: None,
            application_name: None,
        }
    }

    /// Human-readable server address, for logs
    pub fn address(&self) -> String {
        match &self.socket {
            Some(path) => format!("unix:{}", path.display()),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// TLS settings for the configured `sslmode`
    ///
    /// Returns `Ok(None)` when TLS is disabled.
    pub fn tls_config(&self) -> Result<Option<TlsConfig>> {
        TlsConfig::for_mode(self.sslmode, self.ssl_ca.as_deref())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("socket", &self.socket)
            .field("sslmode", &self.sslmode)
            .field("ssl_ca", &self.ssl_ca)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Builder for creating `ConnectionConfig` with advanced options
#[derive(Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    socket: Option<PathBuf>,
    sslmode: SslMode,
    ssl_ca: Option<String>,
    connect_timeout: Duration,
    query_timeout: Option<Duration>,
    application_name: Option<String>,
}

impl ConnectionConfigBuilder {
    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Connect through a Unix socket instead of TCP
    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    /// Set SSL/TLS mode
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.sslmode = mode;
        self
    }

    /// Set the CA certificate path
    pub fn ssl_ca(mut self, path: impl Into<String>) -> Self {
        self.ssl_ca = Some(path.into());
        self
    }

    /// Set the connect timeout
    ///
    /// Covers the TCP connect, TLS negotiation and authentication.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = duration;
        self
    }

    /// Set the per-query timeout
    ///
    /// Default: None (unlimited)
    pub fn query_timeout(mut self, duration: Duration) -> Self {
        self.query_timeout = Some(duration);
        self
    }

    /// Set the application name reported to the server
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            database: self.database,
            socket: self.socket,
            sslmode: self.sslmode,
            ssl_ca: self.ssl_ca,
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
            application_name: self.application_name,
        }
    }
}
