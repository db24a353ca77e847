//! Protocol message types

use crate::error::ServerError;
use bytes::Bytes;

/// A single framed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id
    pub sequence_id: u8,
    /// Payload bytes (without the 4-byte header)
    pub payload: Bytes,
}

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Truncated handshake response asking the server to start TLS
    SslRequest {
        /// Negotiated capability flags (including `CLIENT_SSL`)
        capabilities: u32,
        /// Character set id
        charset: u8,
    },

    /// HandshakeResponse41
    HandshakeResponse(HandshakeResponse),

    /// Raw auth data sent after an AuthSwitchRequest or AuthMoreData
    AuthResponse(Vec<u8>),

    /// COM_QUERY
    Query(String),

    /// COM_PING
    Ping,

    /// COM_QUIT
    Quit,
}

/// HandshakeResponse41 contents
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// Negotiated capability flags
    pub capabilities: u32,
    /// Max packet size
    pub max_packet_size: u32,
    /// Character set id
    pub charset: u8,
    /// Login user
    pub user: String,
    /// Scrambled password for `auth_plugin`
    pub auth_response: Vec<u8>,
    /// Initial schema (sent when `CLIENT_CONNECT_WITH_DB` is set)
    pub database: Option<String>,
    /// Plugin that produced `auth_response`
    pub auth_plugin: String,
    /// Connection attributes (sent when `CLIENT_CONNECT_ATTRS` is set)
    pub attributes: Vec<(String, String)>,
}

/// Initial handshake packet (protocol v10) sent by the server
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Protocol version (always 10)
    pub protocol_version: u8,
    /// Server version string, e.g. `11.4.2-MariaDB`
    pub server_version: String,
    /// Server thread id
    pub connection_id: u32,
    /// Auth nonce (20 bytes for modern servers)
    pub auth_plugin_data: Vec<u8>,
    /// Server capability flags
    pub capabilities: u32,
    /// Server default character set
    pub charset: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Default auth plugin, when `CLIENT_PLUGIN_AUTH` is advertised
    pub auth_plugin_name: Option<String>,
}

/// OK packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Affected rows
    pub affected_rows: u64,
    /// Last insert id
    pub last_insert_id: u64,
    /// Server status flags
    pub status_flags: u16,
    /// Warning count
    pub warnings: u16,
    /// Human-readable info string
    pub info: String,
}

/// EOF packet (pre-`CLIENT_DEPRECATE_EOF`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    /// Warning count
    pub warnings: u16,
    /// Server status flags
    pub status_flags: u16,
}

/// Server response during the authentication exchange
#[derive(Debug, Clone)]
pub enum AuthResponse {
    /// Authentication succeeded
    Ok(OkPacket),
    /// Authentication failed
    Err(ServerError),
    /// Server asks the client to restart with another plugin
    Switch {
        /// Plugin name
        plugin: String,
        /// Fresh nonce for that plugin
        data: Vec<u8>,
    },
    /// Old-style switch to `mysql_old_password` (unsupported)
    OldPasswordSwitch,
    /// Plugin-specific continuation data
    MoreData(Vec<u8>),
}

/// Column definition (Protocol::ColumnDefinition41)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Schema name
    pub schema: String,
    /// Virtual table name (alias)
    pub table: String,
    /// Physical table name
    pub org_table: String,
    /// Virtual column name (alias)
    pub name: String,
    /// Physical column name
    pub org_name: String,
    /// Character set id
    pub charset: u16,
    /// Maximum column length
    pub column_length: u32,
    /// Column type (MYSQL_TYPE_*)
    pub column_type: u8,
    /// Column flags
    pub flags: u16,
    /// Decimal digits
    pub decimals: u8,
}
