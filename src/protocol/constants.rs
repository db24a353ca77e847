//! MariaDB/MySQL protocol constants

/// Handshake protocol version sent by every supported server
pub const PROTOCOL_VERSION: u8 = 10;

/// Largest payload carried by a single packet (2^24 - 1)
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// Max packet size advertised in the handshake response (16 MiB)
pub const MAX_PACKET_SIZE: u32 = 0x0100_0000;

/// Most columns a server will put in one result set
pub const MAX_COLUMNS: u64 = 4096;

/// utf8mb4_general_ci
pub const DEFAULT_CHARSET: u8 = 45;

/// Length of the fixed prefix shared by SSLRequest and HandshakeResponse41
pub const HANDSHAKE_RESPONSE_PREFIX_LEN: usize = 32;

/// Payload header bytes
pub mod headers {
    /// OK packet
    pub const OK: u8 = 0x00;

    /// Extra authentication data (caching_sha2_password)
    pub const AUTH_MORE_DATA: u8 = 0x01;

    /// NULL marker inside a text row
    pub const NULL_VALUE: u8 = 0xFB;

    /// EOF packet / AuthSwitchRequest
    pub const EOF: u8 = 0xFE;

    /// ERR packet
    pub const ERR: u8 = 0xFF;
}

/// Command bytes
pub mod commands {
    /// Close the session
    pub const QUIT: u8 = 0x01;

    /// Text-protocol query
    pub const QUERY: u8 = 0x03;

    /// Liveness check
    pub const PING: u8 = 0x0E;
}

/// Capability flags
pub mod capabilities {
    /// Long password support (CLIENT_MYSQL on MariaDB)
    pub const LONG_PASSWORD: u32 = 0x0000_0001;

    /// Send found rows instead of affected rows
    pub const FOUND_ROWS: u32 = 0x0000_0002;

    /// Get all column flags
    pub const LONG_FLAG: u32 = 0x0000_0004;

    /// Database name in handshake response
    pub const CONNECT_WITH_DB: u32 = 0x0000_0008;

    /// LOAD DATA LOCAL support
    pub const LOCAL_FILES: u32 = 0x0000_0080;

    /// 4.1 protocol
    pub const PROTOCOL_41: u32 = 0x0000_0200;

    /// TLS via SSLRequest
    pub const SSL: u32 = 0x0000_0800;

    /// Transaction status flags in OK packets
    pub const TRANSACTIONS: u32 = 0x0000_2000;

    /// 4.1 authentication (20-byte nonce, length-prefixed auth response)
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;

    /// Multiple statements per COM_QUERY
    pub const MULTI_STATEMENTS: u32 = 0x0001_0000;

    /// Multiple result sets
    pub const MULTI_RESULTS: u32 = 0x0002_0000;

    /// Pluggable authentication
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;

    /// Connection attributes in handshake response
    pub const CONNECT_ATTRS: u32 = 0x0010_0000;

    /// Length-encoded auth response
    pub const PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;

    /// OK packet replaces EOF
    pub const DEPRECATE_EOF: u32 = 0x0100_0000;
}

/// Server status flags
pub mod status {
    /// A transaction is open
    pub const IN_TRANS: u16 = 0x0001;

    /// Autocommit is enabled
    pub const AUTOCOMMIT: u16 = 0x0002;

    /// Another result set follows
    pub const MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Server error codes the client reacts to
pub mod error_codes {
    /// ER_DBACCESS_DENIED_ERROR
    pub const DBACCESS_DENIED: u16 = 1044;

    /// ER_ACCESS_DENIED_ERROR
    pub const ACCESS_DENIED: u16 = 1045;

    /// ER_BAD_DB_ERROR
    pub const BAD_DB: u16 = 1049;

    /// ER_ACCESS_DENIED_NO_PASSWORD_ERROR
    pub const ACCESS_DENIED_NO_PASSWORD: u16 = 1698;

    /// MariaDB progress report pseudo-error
    pub const PROGRESS_REPORT: u16 = 0xFFFF;
}

/// Authentication plugin names
pub mod plugins {
    /// SHA1 challenge/response (MariaDB default)
    pub const NATIVE_PASSWORD: &str = "mysql_native_password";

    /// SHA256 challenge/response with server-side cache (MySQL 8 default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

    /// SHA256 with RSA or TLS
    pub const SHA256_PASSWORD: &str = "sha256_password";

    /// Cleartext password (PAM/LDAP)
    pub const CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// caching_sha2_password AuthMoreData status bytes
pub mod caching_sha2 {
    /// Server cache hit, OK follows
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;

    /// Server needs the full password
    pub const PERFORM_FULL_AUTHENTICATION: u8 = 0x04;
}
