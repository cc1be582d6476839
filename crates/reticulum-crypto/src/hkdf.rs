//! HKDF-SHA256 (RFC 5869) built on [`hmac_sha256`].
//!
//! An absent or empty salt is replaced by 32 zero bytes before extraction.
//! The block counter is a single byte and wraps after 255 blocks.

use crate::hash::hmac_sha256;

const HASH_LEN: usize = 32;

/// `PRK = HMAC-SHA256(salt, ikm)`.
#[must_use]
pub fn extract(salt: Option<&[u8]>, ikm: &[u8]) -> [u8; HASH_LEN] {
    match salt {
        Some(s) if !s.is_empty() => hmac_sha256(s, ikm),
        _ => hmac_sha256(&[0u8; HASH_LEN], ikm),
    }
}

/// Fill `okm` with `T(1) ‖ T(2) ‖ …` where
/// `T(n) = HMAC-SHA256(prk, T(n-1) ‖ info ‖ n)`.
pub fn expand_into(prk: &[u8; HASH_LEN], info: &[u8], okm: &mut [u8]) {
    let mut previous: Option<[u8; HASH_LEN]> = None;
    let mut input = Vec::with_capacity(HASH_LEN + info.len() + 1);
    for (index, chunk) in okm.chunks_mut(HASH_LEN).enumerate() {
        input.clear();
        if let Some(prev) = &previous {
            input.extend_from_slice(prev);
        }
        input.extend_from_slice(info);
        input.push((index as u8).wrapping_add(1));
        let block = hmac_sha256(prk, &input);
        chunk.copy_from_slice(&block[..chunk.len()]);
        previous = Some(block);
    }
}

/// Extract-then-expand into a freshly allocated buffer of `length` bytes.
#[must_use]
pub fn hkdf(length: usize, ikm: &[u8], salt: Option<&[u8]>, info: Option<&[u8]>) -> Vec<u8> {
    let mut okm = vec![0u8; length];
    expand_into(&extract(salt, ikm), info.unwrap_or_default(), &mut okm);
    okm
}

/// Extract-then-expand into a fixed-size array.
#[must_use]
pub fn hkdf_array<const N: usize>(ikm: &[u8], salt: Option<&[u8]>, info: Option<&[u8]>) -> [u8; N] {
    let mut okm = [0u8; N];
    expand_into(&extract(salt, ikm), info.unwrap_or_default(), &mut okm);
    okm
}
