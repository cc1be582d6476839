//! The capability every physical medium exposes to the upper layers.

use std::fmt;
use std::str::FromStr;

use crate::error::SendError;
use crate::types::InterfaceId;

/// Interface operating mode. Determines how long paths learned through the
/// interface stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterfaceMode {
    #[default]
    Full,
    PointToPoint,
    AccessPoint,
    Roaming,
    Boundary,
    Gateway,
}

impl InterfaceMode {
    pub const NAMES: &'static [&'static str] = &[
        "full",
        "point_to_point",
        "access_point",
        "roaming",
        "boundary",
        "gateway",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceMode::Full => "full",
            InterfaceMode::PointToPoint => "point_to_point",
            InterfaceMode::AccessPoint => "access_point",
            InterfaceMode::Roaming => "roaming",
            InterfaceMode::Boundary => "boundary",
            InterfaceMode::Gateway => "gateway",
        }
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(InterfaceMode::Full),
            "point_to_point" | "ptp" => Ok(InterfaceMode::PointToPoint),
            "access_point" | "ap" => Ok(InterfaceMode::AccessPoint),
            "roaming" => Ok(InterfaceMode::Roaming),
            "boundary" => Ok(InterfaceMode::Boundary),
            "gateway" | "gw" => Ok(InterfaceMode::Gateway),
            other => Err(format!(
                "unknown interface mode '{other}', expected one of: {}",
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// A physical medium the node can send raw frames over.
///
/// Implementations are shared as `Arc<dyn ConnectionInterface>` between the
/// path table (which remembers where a path was learned) and links (which
/// send every frame through the interface their request arrived on).
/// `send` must not block; implementations queue the frame for a background
/// transmit task.
pub trait ConnectionInterface: Send + Sync + fmt::Debug {
    /// Stable identifier for this interface instance.
    fn id(&self) -> InterfaceId;

    /// Human-readable name, e.g. `AutoInterface[eth0]`.
    fn name(&self) -> &str;

    fn mode(&self) -> InterfaceMode {
        InterfaceMode::Full
    }

    /// Whether the interface currently has a usable medium.
    fn is_online(&self) -> bool;

    /// Queue `frame` for transmission.
    fn send(&self, frame: &[u8]) -> Result<(), SendError>;
}
