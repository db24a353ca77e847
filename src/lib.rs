//! mariadb-wire: environment-configured MariaDB/MySQL connections
//!
//! The crate speaks the MariaDB/MySQL client/server text protocol directly on
//! top of tokio and wraps it in a small connection manager:
//!
//! * [`load_configuration`] reads `DB_HOST`, `DB_PORT`, `DB_USER`,
//!   `DB_PASSWORD` and `DB_DATABASE` into an immutable [`ConnectionConfig`]
//! * [`open_connection`] / [`close_connection`] manage a handle manually
//! * [`scoped_connection`] opens a connection, hands it to a closure and
//!   closes it on every exit path
//!
//! ```no_run
//! # async fn example() -> mariadb_wire::Result<()> {
//! use futures::FutureExt;
//!
//! let config = mariadb_wire::load_configuration()?;
//! let version = mariadb_wire::scoped_connection(&config, |conn| {
//!     async move {
//!         let rows = conn.query("SELECT VERSION()").await?;
//!         Ok::<_, mariadb_wire::Error>(rows.scalar().unwrap_or_default().to_string())
//!     }
//!     .boxed()
//! })
//! .await?;
//! println!("server version: {version}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod result_set;

pub use client::{
    check_connection, close_connection, load_configuration, open_connection, scoped_connection,
    ServerCheck,
};
pub use connection::{Connection, ConnectionConfig, ConnectionState, SslMode};
pub use error::{Error, Result, ServerError};
pub use result_set::{Column, ResultSet, Row};
