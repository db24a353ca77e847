//! Protocol message encoding

use super::constants::{
    capabilities, commands, HANDSHAKE_RESPONSE_PREFIX_LEN, MAX_PACKET_SIZE, MAX_PAYLOAD_LEN,
};
use super::message::{FrontendMessage, HandshakeResponse};
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a frontend message into framed packets
///
/// `sequence_id` is the id of the first packet and is advanced past every
/// packet written.
pub fn encode_message(msg: &FrontendMessage, sequence_id: &mut u8) -> io::Result<BytesMut> {
    let mut payload = BytesMut::new();

    match msg {
        FrontendMessage::SslRequest {
            capabilities,
            charset,
        } => {
            encode_response_prefix(&mut payload, *capabilities, MAX_PACKET_SIZE, *charset);
        }
        FrontendMessage::HandshakeResponse(response) => {
            encode_handshake_response(&mut payload, response)?;
        }
        FrontendMessage::AuthResponse(data) => {
            payload.put_slice(data);
        }
        FrontendMessage::Query(query) => {
            payload.put_u8(commands::QUERY);
            payload.put_slice(query.as_bytes());
        }
        FrontendMessage::Ping => {
            payload.put_u8(commands::PING);
        }
        FrontendMessage::Quit => {
            payload.put_u8(commands::QUIT);
        }
    }

    Ok(encode_packets(&payload, sequence_id))
}

/// Frame a payload, splitting it at `MAX_PAYLOAD_LEN`
///
/// A payload whose length is a multiple of `MAX_PAYLOAD_LEN` (including the
/// empty payload) is terminated by an empty packet.
pub fn encode_packets(payload: &[u8], sequence_id: &mut u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);

    for chunk in payload.chunks(MAX_PAYLOAD_LEN) {
        put_header(&mut buf, chunk.len(), *sequence_id);
        buf.put_slice(chunk);
        *sequence_id = sequence_id.wrapping_add(1);
    }

    if payload.len() % MAX_PAYLOAD_LEN == 0 {
        put_header(&mut buf, 0, *sequence_id);
        *sequence_id = sequence_id.wrapping_add(1);
    }

    buf
}

fn put_header(buf: &mut BytesMut, len: usize, sequence_id: u8) {
    buf.put_uint_le(len as u64, 3);
    buf.put_u8(sequence_id);
}

/// Append a length-encoded integer
pub fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    if value < 0xFB {
        buf.put_u8(value as u8);
    } else if value <= 0xFFFF {
        buf.put_u8(0xFC);
        buf.put_u16_le(value as u16);
    } else if value <= 0x00FF_FFFF {
        buf.put_u8(0xFD);
        buf.put_uint_le(value, 3);
    } else {
        buf.put_u8(0xFE);
        buf.put_u64_le(value);
    }
}

/// Append a length-encoded string
pub fn put_lenenc_bytes(buf: &mut BytesMut, data: &[u8]) {
    put_lenenc_int(buf, data.len() as u64);
    buf.put_slice(data);
}

fn put_null_terminated(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "string contains an interior NUL byte",
        ));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn encode_response_prefix(buf: &mut BytesMut, capabilities: u32, max_packet_size: u32, charset: u8) {
    let start = buf.len();
    buf.put_u32_le(capabilities);
    buf.put_u32_le(max_packet_size);
    buf.put_u8(charset);
    buf.put_bytes(0, 23);
    debug_assert_eq!(buf.len() - start, HANDSHAKE_RESPONSE_PREFIX_LEN);
}

fn encode_handshake_response(buf: &mut BytesMut, response: &HandshakeResponse) -> io::Result<()> {
    let caps = response.capabilities;
    encode_response_prefix(buf, caps, response.max_packet_size, response.charset);

    put_null_terminated(buf, &response.user)?;

    if caps & capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        put_lenenc_bytes(buf, &response.auth_response);
    } else if caps & capabilities::SECURE_CONNECTION != 0 {
        let len = u8::try_from(response.auth_response.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "auth response longer than 255 bytes")
        })?;
        buf.put_u8(len);
        buf.put_slice(&response.auth_response);
    } else {
        buf.put_slice(&response.auth_response);
        buf.put_u8(0);
    }

    if caps & capabilities::CONNECT_WITH_DB != 0 {
        put_null_terminated(buf, response.database.as_deref().unwrap_or_default())?;
    }

    if caps & capabilities::PLUGIN_AUTH != 0 {
        put_null_terminated(buf, &response.auth_plugin)?;
    }

    if caps & capabilities::CONNECT_ATTRS != 0 {
        let mut attrs = BytesMut::new();
        for (key, value) in &response.attributes {
            put_lenenc_bytes(&mut attrs, key.as_bytes());
            put_lenenc_bytes(&mut attrs, value.as_bytes());
        }
        put_lenenc_bytes(buf, &attrs);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::DEFAULT_CHARSET;

    #[test]
    fn test_encode_ping() {
        let mut seq = 0;
        let buf = encode_message(&FrontendMessage::Ping, &mut seq).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x00, 0x00, 0x00, commands::PING]);
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_encode_query() {
        let mut seq = 0;
        let buf = encode_message(&FrontendMessage::Query("SELECT 1".into()), &mut seq).unwrap();

        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], 0]) as usize;
        assert_eq!(len, buf.len() - 4);
        assert_eq!(buf[3], 0);
        assert_eq!(buf[4], commands::QUERY);
        assert_eq!(&buf[5..], b"SELECT 1");
    }

    #[test]
    fn test_encode_ssl_request() {
        let mut seq = 1;
        let msg = FrontendMessage::SslRequest {
            capabilities: capabilities::PROTOCOL_41 | capabilities::SSL,
            charset: DEFAULT_CHARSET,
        };
        let buf = encode_message(&msg, &mut seq).unwrap();

        // 4-byte header + 32-byte prefix
        assert_eq!(buf.len(), 36);
        assert_eq!(&buf[0..4], &[32, 0, 0, 1]);
        assert_eq!(&buf[4..8], &(capabilities::PROTOCOL_41 | capabilities::SSL).to_le_bytes());
        assert_eq!(&buf[8..12], &MAX_PACKET_SIZE.to_le_bytes());
        assert_eq!(buf[12], DEFAULT_CHARSET);
        assert!(buf[13..].iter().all(|&b| b == 0));
        assert_eq!(seq, 2);
    }

    #[test]
    fn test_encode_handshake_response_layout() {
        let caps = capabilities::PROTOCOL_41
            | capabilities::SECURE_CONNECTION
            | capabilities::PLUGIN_AUTH
            | capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
            | capabilities::CONNECT_WITH_DB;
        let response = HandshakeResponse {
            capabilities: caps,
            max_packet_size: MAX_PACKET_SIZE,
            charset: DEFAULT_CHARSET,
            user: "tye".into(),
            auth_response: vec![0xAA; 20],
            database: Some("mydata".into()),
            auth_plugin: "mysql_native_password".into(),
            attributes: Vec::new(),
        };
        let mut seq = 1;
        let buf = encode_message(&FrontendMessage::HandshakeResponse(response), &mut seq).unwrap();
        let payload = &buf[4..];

        let mut expected = Vec::new();
        expected.extend_from_slice(b"tye\0");
        expected.push(20);
        expected.extend_from_slice(&[0xAA; 20]);
        expected.extend_from_slice(b"mydata\0");
        expected.extend_from_slice(b"mysql_native_password\0");
        assert_eq!(&payload[HANDSHAKE_RESPONSE_PREFIX_LEN..], &expected[..]);
    }

    #[test]
    fn test_encode_handshake_response_with_attributes() {
        let caps = capabilities::PROTOCOL_41
            | capabilities::SECURE_CONNECTION
            | capabilities::CONNECT_ATTRS;
        let response = HandshakeResponse {
            capabilities: caps,
            max_packet_size: MAX_PACKET_SIZE,
            charset: DEFAULT_CHARSET,
            user: "u".into(),
            auth_response: Vec::new(),
            database: None,
            auth_plugin: String::new(),
            attributes: vec![("_pid".into(), "42".into())],
        };
        let mut seq = 1;
        let buf = encode_message(&FrontendMessage::HandshakeResponse(response), &mut seq).unwrap();
        let tail = &buf[4 + HANDSHAKE_RESPONSE_PREFIX_LEN..];

        // user, empty 1-byte auth length, attrs block (len 8: 1+4+1+2)
        assert_eq!(tail, b"u\0\0\x08\x04_pid\x0242");
    }

    #[test]
    fn test_user_with_nul_is_rejected() {
        let response = HandshakeResponse {
            capabilities: capabilities::PROTOCOL_41,
            max_packet_size: MAX_PACKET_SIZE,
            charset: DEFAULT_CHARSET,
            user: "bad\0user".into(),
            auth_response: Vec::new(),
            database: None,
            auth_plugin: String::new(),
            attributes: Vec::new(),
        };
        let mut seq = 1;
        let err = encode_message(&FrontendMessage::HandshakeResponse(response), &mut seq).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_lenenc_int_boundaries() {
        let cases: [(u64, &[u8]); 5] = [
            (0xFA, &[0xFA]),
            (0xFB, &[0xFC, 0xFB, 0x00]),
            (0xFFFF, &[0xFC, 0xFF, 0xFF]),
            (0x1_0000, &[0xFD, 0x00, 0x00, 0x01]),
            (0x100_0000, &[0xFE, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            put_lenenc_int(&mut buf, value);
            assert_eq!(&buf[..], expected, "value {value:#x}");
        }
    }

    #[test]
    fn test_split_large_payload() {
        let payload = vec![7u8; MAX_PAYLOAD_LEN + 10];
        let mut seq = 3;
        let buf = encode_packets(&payload, &mut seq);

        assert_eq!(buf.len(), payload.len() + 8);
        assert_eq!(&buf[0..4], &[0xFF, 0xFF, 0xFF, 3]);
        let second = 4 + MAX_PAYLOAD_LEN;
        assert_eq!(&buf[second..second + 4], &[10, 0, 0, 4]);
        assert_eq!(seq, 5);
    }

    #[test]
    fn test_exact_multiple_gets_empty_trailer() {
        let payload = vec![1u8; MAX_PAYLOAD_LEN];
        let mut seq = 0;
        let buf = encode_packets(&payload, &mut seq);

        assert_eq!(buf.len(), MAX_PAYLOAD_LEN + 8);
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 1]);
        assert_eq!(seq, 2);
    }
}
