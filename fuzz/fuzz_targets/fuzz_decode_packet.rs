#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;
use mariadb_wire::protocol::decode_packet;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several packets may arrive in a single TCP segment
    while !buf.is_empty() {
        match decode_packet(&buf) {
            Ok((packet, consumed)) => {
                assert_eq!(consumed, packet.payload.len() + 4);
                buf.advance(consumed);
            }
            Err(_) => break,
        }
    }
});
