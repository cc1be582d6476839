//! Core types shared by every layer of the mesh node.
//!
//! This crate defines the byte-array identifiers (destination hashes, link
//! ids, interface ids), the [`ConnectionInterface`] capability every physical
//! medium implements, and the [`ShutdownToken`] used to stop background tasks.

pub mod error;
pub mod interface;
pub mod shutdown;
pub mod testing;
pub mod types;

pub use error::{InvalidLength, SendError};
pub use interface::{ConnectionInterface, InterfaceMode};
pub use shutdown::ShutdownToken;
pub use types::{DestinationHash, InterfaceId, LinkId};
