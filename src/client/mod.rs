//! Connection manager API
//!
//! Configuration loading (environment, `.env` file, connection string) and
//! the open/close/scoped helpers built on [`crate::connection::Connection`].

mod connection_string;
mod env;
mod manager;

pub use env::{load_configuration, vars};
pub use manager::{
    check_connection, close_connection, open_connection, scoped_connection, ServerCheck,
};
