//! Link protocol for the mesh node.
//!
//! Turns an inbound link request into an authenticated, encrypted [`Link`],
//! drives the initiator side of the same handshake, and supervises every
//! registered link with a watchdog.

pub mod error;
pub mod link;

pub use error::LinkError;
pub use link::{Link, LinkEstablishment, LinkRegistry, LinkStatus, LinkTable, LinkTimings};
