#![no_main]

use libfuzzer_sys::fuzz_target;
use mariadb_wire::protocol::{
    decode_column_count, decode_column_definition, decode_eof, decode_err, decode_ok,
    decode_text_row, is_eof_packet,
};

fuzz_target!(|data: &[u8]| {
    let (count_bytes, payload) = data.split_at(data.len().min(8));
    let mut raw = [0u8; 8];
    raw[..count_bytes.len()].copy_from_slice(count_bytes);
    let column_count = u64::from_le_bytes(raw) as usize;

    let _ = decode_column_count(data);
    let _ = decode_column_definition(payload);
    let _ = decode_text_row(payload, column_count);
    let _ = decode_ok(payload);
    let _ = decode_err(payload);
    if is_eof_packet(payload) {
        let _ = decode_eof(payload);
    }
});
