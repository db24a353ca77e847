//! Error types

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Server error codes that mean the credentials were rejected
const ACCESS_DENIED_CODES: [u16; 3] = [
    crate::protocol::constants::error_codes::DBACCESS_DENIED,
    crate::protocol::constants::error_codes::ACCESS_DENIED,
    crate::protocol::constants::error_codes::ACCESS_DENIED_NO_PASSWORD,
];

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// An `ERR` packet sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Server error code (e.g. 1045 for access denied)
    pub code: u16,
    /// Five-character SQLSTATE, when the server sent one
    pub sql_state: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Whether the server rejected the supplied credentials
    pub fn is_access_denied(&self) -> bool {
        ACCESS_DENIED_CODES.contains(&self.code)
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "ERROR {} ({}): {}", self.code, state, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

/// Errors returned by mariadb-wire
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket-level failure (refused, reset, unreachable)
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An operation did not finish within its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being attempted
        operation: &'static str,
        /// The deadline that expired
        after: Duration,
    },

    /// The server closed the socket, or the handle was already closed
    #[error("connection closed")]
    ConnectionClosed,

    /// The server sent something this client does not understand
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS negotiation or handshake failure
    #[error("tls error: {0}")]
    Tls(String),

    /// Client-side authentication failure (unsupported plugin, insecure transport)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server refused the connection with an `ERR` packet
    #[error("server rejected connection: {0}")]
    Server(ServerError),

    /// The server rejected a query
    #[error("query failed: {0}")]
    Sql(ServerError),

    /// State machine violation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state description
        expected: String,
        /// Actual state description
        actual: String,
    },

    /// The handle is not ready for another command
    #[error("connection busy: {0}")]
    ConnectionBusy(String),
}

impl Error {
    /// Whether this is a configuration error
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Whether this error came from reaching or talking to the server
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Timeout { .. }
                | Error::ConnectionClosed
                | Error::Protocol(_)
                | Error::Tls(_)
                | Error::Authentication(_)
                | Error::Server(_)
        )
    }

    /// Whether the server (or the client) refused the credentials
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            Error::Authentication(_) => true,
            Error::Server(err) => err.is_access_denied(),
            _ => false,
        }
    }

    /// The server error carried by this error, if any
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) | Error::Sql(err) => Some(err),
            _ => None,
        }
    }

    /// Short category label used for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Timeout { .. } => "timeout",
            Error::ConnectionClosed => "closed",
            Error::Protocol(_) => "protocol",
            Error::Tls(_) => "tls",
            Error::Authentication(_) => "authentication",
            Error::Server(err) if err.is_access_denied() => "authentication",
            Error::Server(_) => "server",
            Error::Sql(_) => "sql",
            Error::InvalidState { .. } => "state",
            Error::ConnectionBusy(_) => "busy",
        }
    }
}
