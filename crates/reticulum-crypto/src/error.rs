/// Errors produced by the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("public key is not a valid curve point")]
    InvalidPublicKey,
    #[error("key agreement produced a non-contributory shared secret")]
    NonContributory,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("HMAC verification failed")]
    InvalidHmac,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid length: {reason}")]
    InvalidLength { reason: &'static str },
}
