//! Error types for the interfaces layer.

/// Errors that can occur during interface operations.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("AutoInterface is not supported on {0}")]
    UnsupportedPlatform(&'static str),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no link-local IPv6 address on {ifname}")]
    AddressResolution { ifname: String },
    #[error("discovery token from {sender} on {ifname} did not verify")]
    AuthenticationFailed { sender: String, ifname: String },
    #[error("interface enumeration failed: {0}")]
    Enumeration(String),
    #[error("interface not connected")]
    NotConnected,
    #[error("interface stopped")]
    Stopped,
}
