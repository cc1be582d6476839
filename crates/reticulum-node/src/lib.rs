//! Node orchestration for the Reticulum mesh.
//!
//! This crate loads configuration, initialises logging, and runs a [`Node`]:
//! one [`Transport`](reticulum_transport::Transport) plus the configured
//! AutoInterfaces, all stopped together on shutdown.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{FrameOutcome, Node, NodeStats, ShutdownHandle};
