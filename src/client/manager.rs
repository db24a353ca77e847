//! Opening, closing and scoped use of connections

use crate::connection::{Connection, ConnectionConfig, Transport};
use crate::metrics::{counters, histograms};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Open a connection
///
/// Connects over TCP (or the configured Unix socket), negotiates TLS per
/// `sslmode` and authenticates, all within `config.connect_timeout`. Not
/// retried.
///
/// # Errors
///
/// - [`Error::Config`] if the TLS settings are unusable
/// - [`Error::Server`] if the server rejects the login (see
///   [`Error::is_authentication_failure`])
/// - [`Error::Timeout`] if the server does not finish the handshake in time
/// - any other connection error for unreachable hosts or protocol mismatches
pub async fn open_connection(config: &ConnectionConfig) -> Result<Connection> {
    let start = Instant::now();
    let result = match tokio::time::timeout(config.connect_timeout, connect(config)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "connect",
            after: config.connect_timeout,
        }),
    };

    match &result {
        Ok(conn) => {
            counters::connection_opened();
            histograms::connect_duration(start.elapsed().as_millis() as u64);
            tracing::info!(
                address = %config.address(),
                server_version = %conn.server_version(),
                connection_id = conn.connection_id(),
                "connection opened"
            );
        }
        Err(e) => {
            counters::connection_failed(e.category());
            tracing::warn!(address = %config.address(), error = %e, "connection failed");
        }
    }

    result
}

async fn connect(config: &ConnectionConfig) -> Result<Connection> {
    let (transport, tls) = match &config.socket {
        Some(path) => {
            if config.sslmode.is_enabled() {
                tracing::debug!(sslmode = %config.sslmode, "TLS is not used over a Unix socket");
            }
            (Transport::connect_unix(path).await?, None)
        }
        None => {
            let tls = config.tls_config()?;
            (Transport::connect_tcp(&config.host, config.port).await?, tls)
        }
    };

    let mut conn = Connection::new(transport);
    conn.startup(config, tls.as_ref()).await?;
    Ok(conn)
}

/// Close a connection
///
/// Sends COM_QUIT and shuts the socket down. Closing an already closed
/// handle is a no-op.
pub async fn close_connection(conn: &mut Connection) -> Result<()> {
    conn.close().await
}

/// Open a connection, run `f` with it, and close it on every exit path
///
/// The connection is closed when `f` returns a value, returns an error,
/// or panics (the panic is resumed after closing). If both `f` and the close
/// fail, the error from `f` is returned and the close error is logged.
/// Dropping the returned future drops the socket.
///
/// # Examples
///
/// ```no_run
/// # async fn example(config: mariadb_wire::ConnectionConfig) -> mariadb_wire::Result<()> {
/// use futures::FutureExt;
///
/// let count = mariadb_wire::scoped_connection(&config, |conn| {
///     async move {
///         let rs = conn.query("SELECT COUNT(*) FROM users").await?;
///         Ok::<_, mariadb_wire::Error>(rs.scalar().unwrap_or("0").parse::<u64>().unwrap_or(0))
///     }
///     .boxed()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn scoped_connection<T, F>(config: &ConnectionConfig, f: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
{
    let mut conn = open_connection(config).await?;

    let body = {
        let conn = &mut conn;
        AssertUnwindSafe(async move { f(conn).await })
            .catch_unwind()
            .await
    };

    let closed = close_connection(&mut conn).await;

    match body {
        Ok(Ok(value)) => closed.map(|()| value),
        Ok(Err(err)) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "failed to close connection after error");
            }
            Err(err)
        }
        Err(panic) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "failed to close connection after panic");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

/// Result of [`check_connection`]
#[derive(Debug, Clone, Serialize)]
pub struct ServerCheck {
    /// `SELECT VERSION()` result
    pub version: String,
    /// Server-side connection id
    pub connection_id: u32,
    /// Whether the session was TLS-encrypted
    pub tls: bool,
    /// Connect + query + close time
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(
    d: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

/// Open a connection, run `SELECT VERSION()` and close it
pub async fn check_connection(config: &ConnectionConfig) -> Result<ServerCheck> {
    let start = Instant::now();

    let (version, connection_id, tls) = scoped_connection(config, |conn| {
        async move {
            let rs = conn.query("SELECT VERSION()").await?;
            let version = rs
                .scalar()
                .ok_or_else(|| Error::Protocol("SELECT VERSION() returned no value".into()))?
                .to_string();
            Ok::<_, Error>((version, conn.connection_id(), conn.is_tls()))
        }
        .boxed()
    })
    .await?;

    Ok(ServerCheck {
        version,
        connection_id,
        tls,
        elapsed: start.elapsed(),
    })
}
