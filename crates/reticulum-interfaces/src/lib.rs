//! Physical interfaces for the mesh node.
//!
//! The only medium implemented here is the AutoInterface: zero-configuration
//! neighbour discovery over IPv6 link-local multicast, with unicast UDP to
//! every discovered peer as the data plane.

pub mod auto;
pub mod error;

pub use auto::{AutoConfig, AutoInterface, DiscoveryScope};
pub use error::InterfaceError;
