//! Core connection type

use super::config::ConnectionConfig;
use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::{AuthPlugin, MoreDataStep};
use crate::metrics::{counters, histograms, labels};
use crate::protocol::constants::{
    capabilities, headers, status, DEFAULT_CHARSET, MAX_COLUMNS, MAX_PACKET_SIZE, MAX_PAYLOAD_LEN,
};
use crate::protocol::{
    decode_auth_response, decode_column_count, decode_column_definition, decode_eof, decode_err,
    decode_handshake, decode_ok, decode_packet, decode_text_row, encode_message, is_eof_packet,
    AuthResponse, FrontendMessage, HandshakeResponse, Packet,
};
use crate::result_set::{Column, ResultSet};
use crate::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Capabilities this client asks for (masked by what the server offers)
const CLIENT_CAPABILITIES: u32 = capabilities::LONG_PASSWORD
    | capabilities::LONG_FLAG
    | capabilities::PROTOCOL_41
    | capabilities::TRANSACTIONS
    | capabilities::SECURE_CONNECTION
    | capabilities::PLUGIN_AUTH
    | capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
    | capabilities::CONNECT_ATTRS;

/// Capabilities every supported server must offer
const REQUIRED_CAPABILITIES: u32 = capabilities::PROTOCOL_41 | capabilities::SECURE_CONNECTION;

const CLIENT_NAME: &str = "mariadb-wire";

/// MariaDB/MySQL connection
///
/// Owned by exactly one caller. Commands take `&mut self`, so a handle
/// never runs two exchanges at once.
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    sequence_id: u8,
    capabilities: u32,
    server_version: String,
    connection_id: u32,
    status_flags: u16,
    query_timeout: Option<Duration>,
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            sequence_id: 0,
            capabilities: 0,
            server_version: String::new(),
            connection_id: 0,
            status_flags: 0,
            query_timeout: None,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the handle has been closed (explicitly or after a fatal error)
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Server version from the greeting, e.g. `11.4.2-MariaDB-log`
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Server-side connection (thread) id
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Negotiated capability flags
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Whether the session is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_tls)
    }

    /// Whether a transaction is open, per the last server status
    pub fn in_transaction(&self) -> bool {
        self.status_flags & status::IN_TRANS != 0
    }

    /// Perform the handshake, optional TLS upgrade and authentication
    pub async fn startup(
        &mut self,
        config: &ConnectionConfig,
        tls_config: Option<&TlsConfig>,
    ) -> Result<()> {
        async {
            self.query_timeout = config.query_timeout;
            self.state.transition(ConnectionState::Handshaking)?;

            // Greeting is packet 0; an ERR here means the server refused us
            // before authentication (too many connections, host blocked)
            self.sequence_id = 0;
            let greeting = self.receive_payload().await?;
            if greeting.first() == Some(&headers::ERR) {
                return Err(Error::Server(decode_err(&greeting).map_err(protocol_error)?));
            }
            let handshake = decode_handshake(&greeting).map_err(protocol_error)?;

            if handshake.capabilities & REQUIRED_CAPABILITIES != REQUIRED_CAPABILITIES {
                return Err(Error::Protocol(format!(
                    "server {} does not support the 4.1 protocol",
                    handshake.server_version
                )));
            }

            self.server_version = handshake.server_version.clone();
            self.connection_id = handshake.connection_id;
            self.status_flags = handshake.status_flags;
            tracing::debug!(
                server_version = %self.server_version,
                connection_id = self.connection_id,
                "received server greeting"
            );

            let mut caps = CLIENT_CAPABILITIES;
            if !config.database.is_empty() {
                caps |= capabilities::CONNECT_WITH_DB;
            }
            caps &= handshake.capabilities;

            if let Some(tls) = tls_config.filter(|_| config.sslmode.is_enabled()) {
                if handshake.capabilities & capabilities::SSL != 0 {
                    caps |= capabilities::SSL;
                    self.negotiate_tls(tls, &config.host, caps).await?;
                } else if config.sslmode.is_required() {
                    return Err(Error::Tls(format!(
                        "server does not support TLS (sslmode={})",
                        config.sslmode
                    )));
                } else {
                    tracing::warn!("server does not support TLS, continuing without encryption");
                }
            }
            self.capabilities = caps;

            self.state.transition(ConnectionState::Authenticating)?;

            let plugin = AuthPlugin::for_handshake(handshake.auth_plugin_name.as_deref());
            let auth_response =
                plugin.respond(&config.password, &handshake.auth_plugin_data, self.is_secure())?;

            let response = HandshakeResponse {
                capabilities: caps,
                max_packet_size: MAX_PACKET_SIZE,
                charset: DEFAULT_CHARSET,
                user: config.user.clone(),
                auth_response,
                database: (!config.database.is_empty()).then(|| config.database.clone()),
                auth_plugin: plugin.name().to_string(),
                attributes: connect_attributes(config),
            };
            self.send_message(&FrontendMessage::HandshakeResponse(response))
                .await?;

            self.authenticate(config, plugin).await?;

            self.state.transition(ConnectionState::Idle)?;
            tracing::info!(
                connection_id = self.connection_id,
                transport = self.transport.as_ref().map_or("none", Transport::kind),
                "startup complete"
            );
            Ok(())
        }
        .instrument(tracing::info_span!(
            "startup",
            address = %config.address(),
            user = %config.user,
            database = %config.database
        ))
        .await
    }

    /// Send SSLRequest and run the TLS handshake on the same socket
    async fn negotiate_tls(&mut self, tls_config: &TlsConfig, hostname: &str, caps: u32) -> Result<()> {
        self.state.transition(ConnectionState::NegotiatingTls)?;

        let ssl_request = FrontendMessage::SslRequest {
            capabilities: caps,
            charset: DEFAULT_CHARSET,
        };
        self.send_message(&ssl_request).await?;

        tracing::debug!("upgrading connection to TLS");
        let transport = self.transport.take().ok_or(Error::ConnectionClosed)?;
        self.transport = Some(transport.upgrade_to_tls(tls_config, hostname).await?);
        tracing::debug!("TLS connection established");
        Ok(())
    }

    /// Run the authentication exchange until the server sends OK or ERR
    async fn authenticate(&mut self, config: &ConnectionConfig, initial: AuthPlugin) -> Result<()> {
        let auth_start = Instant::now();
        let mut plugin = initial;
        counters::auth_attempted(plugin.name());

        loop {
            let payload = self.receive_payload().await?;
            let response = decode_auth_response(&payload).map_err(protocol_error)?;

            match response {
                AuthResponse::Ok(ok) => {
                    self.status_flags = ok.status_flags;
                    tracing::debug!(plugin = %plugin, "authentication successful");
                    counters::auth_successful(plugin.name());
                    histograms::auth_duration(plugin.name(), auth_start.elapsed().as_millis() as u64);
                    return Ok(());
                }
                AuthResponse::Err(err) => {
                    counters::auth_failed(plugin.name(), labels::OUTCOME_SERVER_ERROR);
                    return Err(Error::Server(err));
                }
                AuthResponse::Switch { plugin: name, data } => {
                    let next = AuthPlugin::from_name(&name)
                        .map_err(|e| auth_failure(plugin, e))?;
                    tracing::debug!(from = %plugin, to = %next, "server switched auth plugin");
                    plugin = next;
                    counters::auth_attempted(plugin.name());

                    let data = plugin
                        .respond(&config.password, &data, self.is_secure())
                        .map_err(|e| auth_failure(plugin, e))?;
                    self.send_message(&FrontendMessage::AuthResponse(data))
                        .await?;
                }
                AuthResponse::OldPasswordSwitch => {
                    return Err(auth_failure(
                        plugin,
                        Error::Authentication(
                            "server requested mysql_old_password, which is not supported".into(),
                        ),
                    ));
                }
                AuthResponse::MoreData(data) => {
                    let step = plugin
                        .more_data(&data, &config.password, self.is_secure())
                        .map_err(|e| auth_failure(plugin, e))?;
                    match step {
                        MoreDataStep::AwaitResult => {
                            tracing::debug!("caching_sha2_password fast authentication");
                        }
                        MoreDataStep::Send(data) => {
                            tracing::debug!("caching_sha2_password full authentication");
                            self.send_message(&FrontendMessage::AuthResponse(data))
                                .await?;
                        }
                    }
                }
            }
        }
    }

    /// Run a text-protocol query and collect the whole result
    ///
    /// A server error (`ERR` packet) is returned as [`Error::Sql`] and leaves
    /// the connection usable. Any other failure closes the connection.
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let span = tracing::debug_span!("query", connection_id = self.connection_id);
        self.run_command(FrontendMessage::Query(sql.to_string()), "query")
            .instrument(span)
            .await
    }

    /// Run a statement and return the affected row count
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.query(sql).await?.affected_rows)
    }

    /// Check that the server is still answering (COM_PING)
    pub async fn ping(&mut self) -> Result<()> {
        self.run_command(FrontendMessage::Ping, "ping").await?;
        Ok(())
    }

    async fn run_command(
        &mut self,
        msg: FrontendMessage,
        operation: &'static str,
    ) -> Result<ResultSet> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            other => {
                return Err(Error::ConnectionBusy(format!(
                    "connection in state: {}",
                    other
                )))
            }
        }

        let start = Instant::now();
        let result = match self.query_timeout {
            Some(after) => match tokio::time::timeout(after, self.exchange(&msg)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout { operation, after }),
            },
            None => self.exchange(&msg).await,
        };
        histograms::query_duration(start.elapsed().as_millis() as u64);

        match &result {
            Ok(rs) => {
                counters::query_completed(labels::OUTCOME_SUCCESS);
                histograms::rows_returned(rs.len());
            }
            Err(Error::Sql(err)) => {
                tracing::debug!(code = err.code, "server rejected {}", operation);
                counters::query_completed(labels::OUTCOME_SERVER_ERROR);
            }
            Err(e) => {
                let outcome = match e {
                    Error::Timeout { .. } => labels::OUTCOME_TIMEOUT,
                    _ => labels::OUTCOME_CONNECTION_ERROR,
                };
                counters::query_completed(outcome);
                tracing::warn!(error = %e, "{} failed, closing connection", operation);
                self.abort();
            }
        }

        result
    }

    /// One command round trip
    async fn exchange(&mut self, msg: &FrontendMessage) -> Result<ResultSet> {
        self.state.transition(ConnectionState::QueryInProgress)?;
        self.sequence_id = 0;
        self.send_message(msg).await?;

        let payload = self.receive_payload().await?;
        match payload.first() {
            Some(&headers::OK) => {
                let ok = decode_ok(&payload).map_err(protocol_error)?;
                self.status_flags = ok.status_flags;
                self.state.transition(ConnectionState::Idle)?;
                Ok(ResultSet::from_ok(ok))
            }
            Some(&headers::ERR) => {
                let err = decode_err(&payload).map_err(protocol_error)?;
                self.state.transition(ConnectionState::Idle)?;
                Err(Error::Sql(err))
            }
            Some(&headers::NULL_VALUE) => Err(Error::Protocol(
                "server requested LOAD DATA LOCAL INFILE, which is not supported".into(),
            )),
            Some(_) => {
                let column_count = decode_column_count(&payload).map_err(protocol_error)?;
                self.state.transition(ConnectionState::ReadingResults)?;
                self.read_result_set(column_count as usize).await
            }
            None => Err(Error::Protocol("empty response packet".into())),
        }
    }

    /// Column definitions, EOF, rows, EOF
    async fn read_result_set(&mut self, column_count: usize) -> Result<ResultSet> {
        let mut columns = Vec::with_capacity(column_count.min(MAX_COLUMNS as usize));
        for _ in 0..column_count {
            let payload = self.receive_payload().await?;
            let def = decode_column_definition(&payload).map_err(protocol_error)?;
            columns.push(Column::from(def));
        }

        let payload = self.receive_payload().await?;
        if !is_eof_packet(&payload) {
            return Err(Error::Protocol(
                "expected EOF after column definitions".into(),
            ));
        }

        let mut result = ResultSet::with_columns(columns);
        loop {
            let payload = self.receive_payload().await?;

            if is_eof_packet(&payload) {
                let eof = decode_eof(&payload).map_err(protocol_error)?;
                self.status_flags = eof.status_flags;
                result.finish(eof);
                break;
            }
            if payload.first() == Some(&headers::ERR) {
                // e.g. query killed or max_statement_time hit mid-stream
                let err = decode_err(&payload).map_err(protocol_error)?;
                self.state.transition(ConnectionState::Idle)?;
                return Err(Error::Sql(err));
            }

            let values = decode_text_row(&payload, column_count).map_err(protocol_error)?;
            result.push_row(values);
        }

        if result.status_flags & status::MORE_RESULTS_EXISTS != 0 {
            return Err(Error::Protocol(
                "multiple result sets are not supported".into(),
            ));
        }

        self.state.transition(ConnectionState::Idle)?;
        Ok(result)
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg, &mut self.sequence_id).map_err(protocol_error)?;
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Receive one logical payload, joining split packets
    async fn receive_payload(&mut self) -> Result<Bytes> {
        let first = self.receive_packet().await?;
        if first.payload.len() < MAX_PAYLOAD_LEN {
            return Ok(first.payload);
        }

        let mut joined = BytesMut::from(&first.payload[..]);
        loop {
            let next = self.receive_packet().await?;
            joined.extend_from_slice(&next.payload);
            if next.payload.len() < MAX_PAYLOAD_LEN {
                return Ok(joined.freeze());
            }
        }
    }

    /// Receive one framed packet and check its sequence id
    async fn receive_packet(&mut self) -> Result<Packet> {
        loop {
            match decode_packet(&self.read_buf) {
                Ok((packet, consumed)) => {
                    self.read_buf.advance(consumed);
                    if packet.sequence_id != self.sequence_id {
                        return Err(Error::Protocol(format!(
                            "packets out of order: expected sequence id {}, got {}",
                            self.sequence_id, packet.sequence_id
                        )));
                    }
                    self.sequence_id = self.sequence_id.wrapping_add(1);
                    return Ok(packet);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(protocol_error(e)),
            }

            // Need more data
            let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn is_secure(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_secure)
    }

    /// Drop the socket without the QUIT handshake
    fn abort(&mut self) {
        self.state = ConnectionState::Closed;
        self.transport = None;
        self.read_buf.clear();
    }

    /// Close the connection
    ///
    /// Sends COM_QUIT (best effort) and shuts the socket down. Calling it on
    /// a closed handle does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        let send_quit = self.state == ConnectionState::Idle;
        self.state.transition(ConnectionState::Closed)?;

        if send_quit {
            self.sequence_id = 0;
            if let Err(e) = self.send_message(&FrontendMessage::Quit).await {
                tracing::debug!(error = %e, "failed to send COM_QUIT");
            }
        }

        let result = match self.transport.take() {
            Some(mut transport) => transport.shutdown().await,
            None => Ok(()),
        };
        self.read_buf.clear();

        counters::connection_closed();
        tracing::debug!(connection_id = self.connection_id, "connection closed");
        result
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("server_version", &self.server_version)
            .field("connection_id", &self.connection_id)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.transport.is_some() && self.state != ConnectionState::Closed {
            tracing::debug!(
                connection_id = self.connection_id,
                state = %self.state,
                "connection dropped without close"
            );
        }
    }
}

fn protocol_error(e: io::Error) -> Error {
    Error::Protocol(e.to_string())
}

fn auth_failure(plugin: AuthPlugin, err: Error) -> Error {
    counters::auth_failed(plugin.name(), "client_error");
    err
}

/// Connection attributes shown in `performance_schema.session_connect_attrs`
fn connect_attributes(config: &ConnectionConfig) -> Vec<(String, String)> {
    let program_name = config
        .application_name
        .clone()
        .unwrap_or_else(|| CLIENT_NAME.to_string());

    vec![
        ("_client_name".to_string(), CLIENT_NAME.to_string()),
        (
            "_client_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        ("_os".to_string(), std::env::consts::OS.to_string()),
        ("_pid".to_string(), std::process::id().to_string()),
        ("program_name".to_string(), program_name),
    ]
}
