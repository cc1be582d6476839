//! Link lifecycle: handshake, state, registry and watchdog.
//!
//! ```text
//! INITIATOR                                   RESPONDER
//!     |-- request [dest(16) x25519(32) ed25519(32)] -->|
//!     |                                                |  ECDH + HKDF(64)
//!     |<-- proof [link_id(16) sig(64) x25519(32)] -----|
//!     |  ECDH + HKDF(64), verify sig                   |
//!     |             === LINK ACTIVE ===                |
//! ```

pub mod constants;
pub mod establishment;
pub mod handshake;
pub mod registry;
pub mod state;
pub mod types;
pub mod watchdog;

pub use constants::*;
pub use establishment::{LinkEstablishment, LocalDestination, RequestPacket};
pub use registry::{LinkRegistry, LinkTable};
pub use state::Link;
pub use types::{DerivedKey, LinkRole, LinkStats, LinkStatus, LinkTimings, TeardownReason};
