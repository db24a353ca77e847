//! Password scrambles for the challenge/response auth plugins
//!
//! Both plugins prove knowledge of the password without sending it: the
//! client XORs a hash of the password with a hash that mixes in the server's
//! nonce, and the server (which stores only the double hash) reverses it.

use sha1::{Digest, Sha1};
use sha2::Sha256;

/// `mysql_native_password` response
///
/// `SHA1(password) XOR SHA1(nonce || SHA1(SHA1(password)))`
///
/// An empty password produces an empty response.
pub fn scramble_native(password: &[u8], nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password);
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(stage2);
    let mask = hasher.finalize();

    xor(&stage1, &mask)
}

/// `caching_sha2_password` fast-path response
///
/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) || nonce)`
///
/// An empty password produces an empty response.
pub fn scramble_caching_sha2(password: &[u8], nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha256::digest(password);
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(nonce);
    let mask = hasher.finalize();

    xor(&stage1, &mask)
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &[u8] = b"abcdefghijklmnopqrst";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_native_password_known_vector() {
        let scrambled = scramble_native(b"1234", NONCE);
        assert_eq!(scrambled.len(), 20);
        assert_eq!(hex(&scrambled), "8f143a54b962d3e54bf79b3b2bcc09c305a2fa24");
    }

    #[test]
    fn test_native_password_second_vector() {
        assert_eq!(
            hex(&scramble_native(b"secret", NONCE)),
            "8817c50fa779daef010ee7577825b0847df9842e"
        );
    }

    #[test]
    fn test_caching_sha2_known_vector() {
        let scrambled = scramble_caching_sha2(b"1234", NONCE);
        assert_eq!(scrambled.len(), 32);
        assert_eq!(
            hex(&scrambled),
            "c67d4910c632ba9ae593a2214af8c82f23f000894c54c43967dd75a92683f0a0"
        );
    }

    #[test]
    fn test_empty_password_produces_empty_response() {
        assert!(scramble_native(b"", NONCE).is_empty());
        assert!(scramble_caching_sha2(b"", NONCE).is_empty());
    }

    #[test]
    fn test_nonce_changes_response() {
        let a = scramble_native(b"1234", NONCE);
        let b = scramble_native(b"1234", b"tsrqponmlkjihgfedcba");
        assert_ne!(a, b);
    }
}
