//! Cryptographic primitives used by discovery and link establishment.
//!
//! Discovery tokens are plain SHA-256 digests. Link establishment combines an
//! X25519 agreement, HKDF-SHA256 key derivation and Ed25519 proofs; an
//! established link then protects its traffic with [`Token`].

pub mod error;
pub mod hash;
pub mod hkdf;
pub mod keys;
pub mod token;

pub use error::CryptoError;
pub use hash::{hmac_sha256, sha256, sha256_concat, truncated_hash};
pub use keys::{
    AgreementPublicKey, AgreementSecret, SharedSecret, Signature, SigningKey, VerifyingKey,
};
pub use token::Token;
