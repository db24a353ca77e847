#![no_main]

use libfuzzer_sys::fuzz_target;
use mariadb_wire::protocol::{decode_auth_response, decode_handshake};

fuzz_target!(|data: &[u8]| {
    // Both run on untrusted bytes before the server is authenticated
    let _ = decode_handshake(data);
    let _ = decode_auth_response(data);
});
