//! Link protocol errors.

use reticulum_core::{LinkId, SendError};
use reticulum_crypto::CryptoError;

use crate::link::LinkStatus;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The request payload was not exactly two public keys long.
    #[error("malformed link request: expected {expected} bytes, got {actual}")]
    MalformedRequest { expected: usize, actual: usize },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("invalid link proof")]
    InvalidProof,

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("illegal link transition: {from} -> {to}")]
    InvalidTransition { from: LinkStatus, to: LinkStatus },

    #[error("link {0} is already registered")]
    DuplicateLink(LinkId),

    #[error("no link with id {0}")]
    UnknownLink(LinkId),

    #[error("link is not established (state {0})")]
    NotEstablished(LinkStatus),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("send failed: {0}")]
    Send(#[from] SendError),
}
