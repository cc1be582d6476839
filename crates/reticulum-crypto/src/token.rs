//! Authenticated link encryption.
//!
//! A token is `IV (16) ‖ AES-256-CBC ciphertext ‖ HMAC-SHA256 (32)`, with
//! PKCS#7 padding and the MAC computed over `IV ‖ ciphertext`. The 64-byte
//! link key is split into the HMAC key (first half) and the AES key (second
//! half).

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::CryptoError;
use crate::hash::{hmac_sha256, hmac_sha256_verify};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const BLOCK: usize = 16;

/// Smallest possible token: IV, one padded block, MAC.
pub const MIN_TOKEN_LEN: usize = IV_LEN + BLOCK + MAC_LEN;

/// Size of the token produced for a plaintext of `len` bytes.
pub const fn token_len(len: usize) -> usize {
    IV_LEN + (len / BLOCK + 1) * BLOCK + MAC_LEN
}

pub struct Token {
    mac_key: [u8; 32],
    cipher_key: [u8; 32],
}

impl Token {
    pub fn new(key: &[u8; 64]) -> Self {
        let mut mac_key = [0u8; 32];
        let mut cipher_key = [0u8; 32];
        mac_key.copy_from_slice(&key[..32]);
        cipher_key.copy_from_slice(&key[32..]);
        Self {
            mac_key,
            cipher_key,
        }
    }

    /// Encrypt under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, &iv)
    }

    pub fn encrypt_with_iv(&self, plaintext: &[u8], iv: &[u8; IV_LEN]) -> Vec<u8> {
        let ciphertext = Encryptor::new((&self.cipher_key).into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
        out.extend_from_slice(iv);
        out.extend_from_slice(&ciphertext);
        let mac = hmac_sha256(&self.mac_key, &out);
        out.extend_from_slice(&mac);
        out
    }

    /// Verify the MAC, then decrypt. The MAC is checked before any
    /// decryption work is done.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if token.len() < MIN_TOKEN_LEN {
            return Err(CryptoError::InvalidLength {
                reason: "token shorter than IV, one block and MAC",
            });
        }
        let (signed, mac) = token.split_at(token.len() - MAC_LEN);
        hmac_sha256_verify(&self.mac_key, signed, mac)?;

        let (iv, ciphertext) = signed.split_at(IV_LEN);
        if !ciphertext.len().is_multiple_of(BLOCK) {
            return Err(CryptoError::DecryptionFailed);
        }
        let iv: &[u8; IV_LEN] = iv.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
        Decryptor::new((&self.cipher_key).into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.mac_key = [0u8; 32];
        self.cipher_key = [0u8; 32];
    }
}
