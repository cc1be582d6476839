//! Routing state and the transport context.
//!
//! [`PathTable`] keeps the best known route to every reachable destination;
//! [`Transport`] owns the path table and the link registry and runs the
//! periodic table sweep.

pub mod clock;
pub mod error;
pub mod path;
pub mod transport;

pub use clock::Clock;
pub use error::PathError;
pub use path::{Hops, PathTable};
pub use transport::{Transport, TransportConfig};
