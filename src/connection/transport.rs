//! Byte transport under the protocol codec
//!
//! A session starts on plain TCP or a Unix socket. TCP sessions may be
//! upgraded in place to TLS after the SSLRequest packet; Unix sockets never
//! are.

use super::tls::{parse_server_name, TlsConfig};
use crate::{Error, Result};
use bytes::BytesMut;
use rustls_pki_types::ServerName;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Socket carrying the session
pub enum Transport {
    /// Plain TCP
    Tcp(TcpStream),
    /// TCP upgraded to TLS
    Tls(Box<TlsStream<TcpStream>>),
    /// Unix domain socket
    Unix(UnixStream),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transport({})", self.kind())
    }
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

impl Transport {
    /// Connect via plain TCP
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Transport::Tcp(stream))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Transport::Unix(stream))
    }

    /// Short label for logs: `tcp`, `tls` or `unix`
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Tcp(_) => "tcp",
            Transport::Tls(_) => "tls",
            Transport::Unix(_) => "unix",
        }
    }

    /// Whether the password may cross this transport in cleartext
    pub fn is_secure(&self) -> bool {
        !matches!(self, Transport::Tcp(_))
    }

    /// Whether TLS is active
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    fn stream(&mut self) -> &mut dyn Stream {
        match self {
            Transport::Tcp(stream) => stream,
            Transport::Tls(stream) => &mut **stream,
            Transport::Unix(stream) => stream,
        }
    }

    /// Write bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream().write_all(buf).await?;
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        self.stream().flush().await?;
        Ok(())
    }

    /// Read bytes into buffer, returning 0 at end of stream
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        Ok(self.stream().read_buf(buf).await?)
    }

    /// Run the TLS handshake on a plain TCP transport
    ///
    /// Called right after the SSLRequest packet; `hostname` is used for SNI
    /// and, depending on the TLS config, certificate name checks.
    pub async fn upgrade_to_tls(self, tls_config: &TlsConfig, hostname: &str) -> Result<Self> {
        let tcp_stream = match self {
            Transport::Tcp(stream) => stream,
            Transport::Tls(_) => {
                return Err(Error::Tls("transport is already TLS-encrypted".into()))
            }
            Transport::Unix(_) => {
                return Err(Error::Tls("cannot upgrade Unix socket to TLS".into()))
            }
        };

        let server_name = ServerName::try_from(parse_server_name(hostname)?)
            .map_err(|_| Error::Tls(format!("invalid hostname for TLS: {}", hostname)))?;

        let tls_stream = TlsConnector::from(tls_config.client_config())
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))?;

        Ok(Transport::Tls(Box::new(tls_stream)))
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream().shutdown().await?;
        Ok(())
    }
}
