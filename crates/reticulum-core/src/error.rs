//! Error types for the reticulum-core crate.

/// A byte slice had the wrong length for the identifier being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid length: expected {expected}, got {actual}")]
pub struct InvalidLength {
    pub expected: usize,
    pub actual: usize,
}

/// Failure to hand a frame to a physical interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("interface {0} is offline")]
    Offline(String),
    #[error("interface {0} has been stopped")]
    Stopped(String),
    #[error("frame of {size} bytes exceeds interface MTU of {mtu}")]
    TooLarge { size: usize, mtu: usize },
    #[error("send failed: {0}")]
    Io(String),
}
