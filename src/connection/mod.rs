//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP vs Unix socket, optional TLS)
//! * Connection lifecycle (handshake, auth, queries, close)
//! * State machine enforcement
//! * Connection configuration

mod config;
mod conn;
mod state;
mod tls;
mod transport;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT,
};
pub use conn::Connection;
pub use state::ConnectionState;
pub use tls::{parse_server_name, SslMode, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
