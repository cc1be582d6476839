//! SHA-256 digests and HMAC-SHA256.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`, without allocating the
/// concatenation.
#[must_use]
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// First 128 bits of SHA-256, the width of destination hashes and link ids.
#[must_use]
pub fn truncated_hash(data: &[u8]) -> [u8; 16] {
    let full = sha256(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&full[..16]);
    out
}

fn keyed(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length; the error arm is unreachable.
    match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    }
}

#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = keyed(key);
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time check of `tag` against HMAC-SHA256(`key`, `data`).
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
    let mut mac = keyed(key);
    mac.update(data);
    mac.verify_slice(tag).map_err(|_| CryptoError::InvalidHmac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_answers() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(sha256(b"reticulum")),
            "eac4d70bfb1c16e45e39485e31e1f5ccb18cedf878e0310d9a96100168f89f0d"
        );
    }

    #[test]
    fn concat_matches_one_shot() {
        assert_eq!(sha256_concat(&[b"mesh1".as_slice(), b"fe80::1".as_slice()]), sha256(b"mesh1fe80::1"));
        assert_eq!(sha256_concat(&[]), sha256(b""));
    }

    #[test]
    fn truncated_is_prefix_of_full() {
        let full = sha256(b"reticulum");
        assert_eq!(truncated_hash(b"reticulum"), full[..16]);
    }

    #[test]
    fn hmac_known_answer() {
        let tag = hmac_sha256(b"key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            hex::encode(tag),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn hmac_verify_rejects_tampering() {
        let tag = hmac_sha256(&[0xAA; 32], b"data A");
        assert!(hmac_sha256_verify(&[0xAA; 32], b"data A", &tag).is_ok());
        assert_eq!(
            hmac_sha256_verify(&[0xBB; 32], b"data A", &tag),
            Err(CryptoError::InvalidHmac)
        );
        assert_eq!(
            hmac_sha256_verify(&[0xAA; 32], b"data B", &tag),
            Err(CryptoError::InvalidHmac)
        );
        assert_eq!(
            hmac_sha256_verify(&[0xAA; 32], b"data A", &tag[..31]),
            Err(CryptoError::InvalidHmac)
        );
    }
}
