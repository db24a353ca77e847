//! Protocol message decoding

use super::constants::{capabilities, headers, MAX_COLUMNS, PROTOCOL_VERSION};
use super::message::{AuthResponse, ColumnDefinition, EofPacket, Handshake, OkPacket, Packet};
use crate::error::ServerError;
use bytes::Bytes;
use std::io;

/// Decode one framed packet from the front of `data`
///
/// # Returns
/// `Ok((packet, consumed))` - Packet and number of bytes consumed
/// `Err(e)` - `UnexpectedEof` if the packet is incomplete
pub fn decode_packet(data: &[u8]) -> io::Result<(Packet, usize)> {
    if data.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete packet header",
        ));
    }

    let len = u32::from_le_bytes([data[0], data[1], data[2], 0]) as usize;
    let sequence_id = data[3];

    if data.len() < len + 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete packet body",
        ));
    }

    let packet = Packet {
        sequence_id,
        payload: Bytes::copy_from_slice(&data[4..len + 4]),
    };
    Ok((packet, len + 4))
}

/// Decode the server's initial handshake (protocol v10)
pub fn decode_handshake(payload: &[u8]) -> io::Result<Handshake> {
    let mut r = Reader::new(payload);

    let protocol_version = r.u8("protocol version")?;
    if protocol_version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported handshake protocol version: {}", protocol_version),
        ));
    }

    let server_version = r.null_terminated("server version")?;
    let connection_id = r.u32("connection id")?;
    let mut auth_plugin_data = r.take(8, "auth plugin data")?.to_vec();
    r.skip(1, "filler")?;
    let mut caps = u32::from(r.u16("capability flags")?);

    let mut charset = 0;
    let mut status_flags = 0;
    let mut auth_plugin_name = None;

    if !r.is_empty() {
        charset = r.u8("character set")?;
        status_flags = r.u16("status flags")?;
        caps |= u32::from(r.u16("capability flags")?) << 16;
        let auth_data_len = r.u8("auth plugin data length")? as usize;
        // 6 reserved bytes + 4 bytes of MariaDB extended capabilities
        r.skip(10, "reserved")?;

        if caps & capabilities::SECURE_CONNECTION != 0 {
            let len = auth_data_len.saturating_sub(8).max(13).min(r.remaining());
            let part2 = r.take(len, "auth plugin data")?;
            let part2 = part2.strip_suffix(&[0]).unwrap_or(part2);
            auth_plugin_data.extend_from_slice(part2);
        }

        if caps & capabilities::PLUGIN_AUTH != 0 && !r.is_empty() {
            // Some 5.5 servers omit the terminating NUL
            let name = r.null_terminated_or_rest();
            if !name.is_empty() {
                auth_plugin_name = Some(name);
            }
        }
    }

    Ok(Handshake {
        protocol_version,
        server_version,
        connection_id,
        auth_plugin_data,
        capabilities: caps,
        charset,
        status_flags,
        auth_plugin_name,
    })
}

/// Decode an OK packet (header `0x00`, or `0xFE` when it terminates a result)
pub fn decode_ok(payload: &[u8]) -> io::Result<OkPacket> {
    let mut r = Reader::new(payload);
    let header = r.u8("ok header")?;
    if header != headers::OK && header != headers::EOF {
        return Err(invalid(format!("expected OK packet, got header 0x{:02X}", header)));
    }

    let affected_rows = r.lenenc_int("affected rows")?;
    let last_insert_id = r.lenenc_int("last insert id")?;
    let (status_flags, warnings) = if r.remaining() >= 4 {
        (r.u16("status flags")?, r.u16("warnings")?)
    } else {
        (0, 0)
    };
    let info = String::from_utf8_lossy(r.rest()).to_string();

    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Decode an ERR packet
pub fn decode_err(payload: &[u8]) -> io::Result<ServerError> {
    let mut r = Reader::new(payload);
    let header = r.u8("err header")?;
    if header != headers::ERR {
        return Err(invalid(format!("expected ERR packet, got header 0x{:02X}", header)));
    }

    let code = r.u16("error code")?;
    let sql_state = if r.peek() == Some(b'#') {
        r.skip(1, "sql state marker")?;
        Some(String::from_utf8_lossy(r.take(5, "sql state")?).to_string())
    } else {
        None
    };
    let message = String::from_utf8_lossy(r.rest()).to_string();

    Ok(ServerError {
        code,
        sql_state,
        message,
    })
}

/// Whether a payload is an EOF packet rather than a row starting with 0xFE
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&headers::EOF) && payload.len() < 9
}

/// Decode an EOF packet
pub fn decode_eof(payload: &[u8]) -> io::Result<EofPacket> {
    let mut r = Reader::new(payload);
    let header = r.u8("eof header")?;
    if header != headers::EOF {
        return Err(invalid(format!("expected EOF packet, got header 0x{:02X}", header)));
    }

    if r.remaining() < 4 {
        return Ok(EofPacket::default());
    }
    Ok(EofPacket {
        warnings: r.u16("warnings")?,
        status_flags: r.u16("status flags")?,
    })
}

/// Decode a server reply during the authentication exchange
pub fn decode_auth_response(payload: &[u8]) -> io::Result<AuthResponse> {
    let header = *payload
        .first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "empty auth response"))?;

    match header {
        headers::OK => Ok(AuthResponse::Ok(decode_ok(payload)?)),
        headers::ERR => Ok(AuthResponse::Err(decode_err(payload)?)),
        headers::EOF if payload.len() == 1 => Ok(AuthResponse::OldPasswordSwitch),
        headers::EOF => {
            let mut r = Reader::new(&payload[1..]);
            let plugin = r.null_terminated("auth switch plugin name")?;
            let data = r.rest();
            let data = data.strip_suffix(&[0]).unwrap_or(data);
            Ok(AuthResponse::Switch {
                plugin,
                data: data.to_vec(),
            })
        }
        headers::AUTH_MORE_DATA => Ok(AuthResponse::MoreData(payload[1..].to_vec())),
        other => Err(invalid(format!(
            "unexpected auth response header: 0x{:02X}",
            other
        ))),
    }
}

/// Decode the column count that opens a result set
pub fn decode_column_count(payload: &[u8]) -> io::Result<u64> {
    let mut r = Reader::new(payload);
    let count = r.lenenc_int("column count")?;
    if !r.is_empty() {
        return Err(invalid("trailing bytes after column count".to_string()));
    }
    if count == 0 || count > MAX_COLUMNS {
        return Err(invalid(format!(
            "column count {} outside 1..={}",
            count, MAX_COLUMNS
        )));
    }
    Ok(count)
}

/// Decode a ColumnDefinition41 packet
pub fn decode_column_definition(payload: &[u8]) -> io::Result<ColumnDefinition> {
    let mut r = Reader::new(payload);

    let _catalog = r.lenenc_bytes("catalog")?;
    let schema = r.lenenc_string("schema")?;
    let table = r.lenenc_string("table")?;
    let org_table = r.lenenc_string("org table")?;
    let name = r.lenenc_string("name")?;
    let org_name = r.lenenc_string("org name")?;
    let _fixed_len = r.lenenc_int("fixed fields length")?;
    let charset = r.u16("character set")?;
    let column_length = r.u32("column length")?;
    let column_type = r.u8("column type")?;
    let flags = r.u16("column flags")?;
    let decimals = r.u8("decimals")?;

    Ok(ColumnDefinition {
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

/// Decode a text-protocol row with `column_count` cells
pub fn decode_text_row(payload: &[u8], column_count: usize) -> io::Result<Vec<Option<Bytes>>> {
    let mut r = Reader::new(payload);
    // Every cell takes at least one byte
    let mut values = Vec::with_capacity(column_count.min(payload.len()));

    for _ in 0..column_count {
        if r.peek() == Some(headers::NULL_VALUE) {
            r.skip(1, "null marker")?;
            values.push(None);
        } else {
            let value = r.lenenc_bytes("column value")?;
            values.push(Some(Bytes::copy_from_slice(value)));
        }
    }

    if !r.is_empty() {
        return Err(invalid(format!(
            "row has {} trailing bytes after {} columns",
            r.remaining(),
            column_count
        )));
    }

    Ok(values)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

/// Little-endian cursor over a packet payload
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take(&mut self, n: usize, what: &str) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(eof(what));
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize, what: &str) -> io::Result<()> {
        self.take(n, what).map(|_| ())
    }

    fn rest(&mut self) -> &'a [u8] {
        let data = self.data;
        let slice = &data[self.pos..];
        self.pos = data.len();
        slice
    }

    fn u8(&mut self, what: &str) -> io::Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> io::Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> io::Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn lenenc_int(&mut self, what: &str) -> io::Result<u64> {
        match self.u8(what)? {
            n @ 0x00..=0xFA => Ok(u64::from(n)),
            0xFC => {
                let b = self.take(2, what)?;
                Ok(u64::from(u16::from_le_bytes([b[0], b[1]])))
            }
            0xFD => {
                let b = self.take(3, what)?;
                Ok(u64::from(u32::from_le_bytes([b[0], b[1], b[2], 0])))
            }
            0xFE => {
                let b = self.take(8, what)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(u64::from_le_bytes(raw))
            }
            other => Err(invalid(format!(
                "invalid length-encoded integer prefix 0x{:02X} in {}",
                other, what
            ))),
        }
    }

    fn lenenc_bytes(&mut self, what: &str) -> io::Result<&'a [u8]> {
        let len = self.lenenc_int(what)?;
        let len = usize::try_from(len).map_err(|_| invalid(format!("{} too long", what)))?;
        self.take(len, what)
    }

    fn lenenc_string(&mut self, what: &str) -> io::Result<String> {
        Ok(String::from_utf8_lossy(self.lenenc_bytes(what)?).to_string())
    }

    fn null_terminated(&mut self, what: &str) -> io::Result<String> {
        let data = self.data;
        let rest = &data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            invalid(format!("missing null terminator in {}", what))
        })?;
        let s = String::from_utf8_lossy(&rest[..end]).to_string();
        self.pos += end + 1;
        Ok(s)
    }

    fn null_terminated_or_rest(&mut self) -> String {
        let data = self.data;
        let rest = &data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                String::from_utf8_lossy(&rest[..end]).to_string()
            }
            None => {
                self.pos = data.len();
                String::from_utf8_lossy(rest).to_string()
            }
        }
    }
}
