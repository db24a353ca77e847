//! MariaDB/MySQL client/server protocol
//!
//! Packet framing plus the payload codecs used by the text protocol:
//! handshake, authentication exchange, COM_QUERY result sets, OK/ERR/EOF.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{
    decode_auth_response, decode_column_count, decode_column_definition, decode_eof, decode_err,
    decode_handshake, decode_ok, decode_packet, decode_text_row, is_eof_packet,
};
pub use encode::{encode_message, encode_packets};
pub use message::{
    AuthResponse, ColumnDefinition, EofPacket, FrontendMessage, Handshake, HandshakeResponse,
    OkPacket, Packet,
};
