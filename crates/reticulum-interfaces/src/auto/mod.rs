//! Auto interface: automatic peer discovery via IPv6 multicast.
//!
//! Implements a two-phase protocol:
//! 1. **Discovery**: periodic multicast announcements to find peers on the LAN
//! 2. **Data transport**: unicast UDP directly to discovered peers
//!
//! Every timer is derived from one base peering timeout `T`:
//!
//! | tunable                  | value   |
//! |--------------------------|---------|
//! | announce interval        | `T / 6` |
//! | peer job interval        | `T * 1.1` |
//! | peering timeout          | `T`     |
//! | multicast echo timeout   | `T / 2` |

pub mod discovery;
pub mod interface;
pub mod netif;
pub mod peer;
mod sockets;

pub use discovery::{DiscoveryOutcome, MulticastGroup, discovery_token, verify_discovery_token};
pub use interface::{AutoInterface, InboundFrame, Reconciliation};
pub use netif::{InterfaceSource, LocalInterface, NetInterface, Platform, SystemInterfaces};
pub use peer::{Peer, PeerRegistry};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::error;

use reticulum_core::InterfaceMode;

use crate::error::InterfaceError;

/// Default multicast discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 29716;

/// Default unicast data port.
pub const DEFAULT_DATA_PORT: u16 = 42671;

/// Default group identifier.
pub const DEFAULT_GROUP_ID: &str = "reticulum";

/// Default base peering timeout.
pub const PEERING_TIMEOUT: Duration = Duration::from_millis(22_000);

/// Hardware MTU for the Auto interface.
pub const HW_MTU: usize = 1196;

/// Dedup ring buffer length.
pub const MULTI_IF_DEQUE_LEN: usize = 48;

/// Dedup entry time-to-live.
pub const MULTI_IF_DEQUE_TTL: Duration = Duration::from_millis(750);

/// Size of the UDP receive buffer.
pub const RECV_BUFFER: usize = 2048;

/// Frames queued per adopted interface before `send` reports back-pressure.
pub const OUTBOUND_QUEUE: usize = 64;

/// IPv6 multicast discovery scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscoveryScope {
    /// Link-local (scope 2), same physical LAN segment.
    #[default]
    Link,
    /// Admin-local (scope 4).
    Admin,
    /// Site-local (scope 5).
    Site,
    /// Organisation-local (scope 8).
    Organisation,
    /// Global (scope e).
    Global,
}

impl DiscoveryScope {
    pub const NAMES: &'static [&'static str] = &["link", "admin", "site", "organisation", "global"];

    /// Return the single hex character used in the IPv6 multicast address.
    pub fn as_hex_char(self) -> char {
        match self {
            DiscoveryScope::Link => '2',
            DiscoveryScope::Admin => '4',
            DiscoveryScope::Site => '5',
            DiscoveryScope::Organisation => '8',
            DiscoveryScope::Global => 'e',
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            DiscoveryScope::Link => 0x2,
            DiscoveryScope::Admin => 0x4,
            DiscoveryScope::Site => 0x5,
            DiscoveryScope::Organisation => 0x8,
            DiscoveryScope::Global => 0xe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryScope::Link => "link",
            DiscoveryScope::Admin => "admin",
            DiscoveryScope::Site => "site",
            DiscoveryScope::Organisation => "organisation",
            DiscoveryScope::Global => "global",
        }
    }
}

impl fmt::Display for DiscoveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryScope {
    type Err = InterfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link" => Ok(DiscoveryScope::Link),
            "admin" => Ok(DiscoveryScope::Admin),
            "site" => Ok(DiscoveryScope::Site),
            "organisation" => Ok(DiscoveryScope::Organisation),
            "global" => Ok(DiscoveryScope::Global),
            other => Err(InterfaceError::Configuration(format!(
                "unknown discovery scope '{other}', expected one of: {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Configuration for an [`AutoInterface`].
#[derive(Debug, Clone)]
pub struct AutoConfig {
    /// Human-readable name for this interface.
    pub name: String,
    /// Group identifier; peers must share the same group to discover each other.
    pub group_id: String,
    pub discovery_scope: DiscoveryScope,
    pub discovery_port: u16,
    pub data_port: u16,
    /// Only use these network interfaces (empty = all eligible).
    pub devices: Vec<String>,
    pub ignored_interfaces: Vec<String>,
    /// Base peering timeout every other timer is derived from.
    pub peering_timeout: Duration,
    pub mode: InterfaceMode,
}

impl AutoConfig {
    /// Create a default configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            discovery_scope: DiscoveryScope::Link,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            data_port: DEFAULT_DATA_PORT,
            devices: Vec::new(),
            ignored_interfaces: Vec::new(),
            peering_timeout: PEERING_TIMEOUT,
            mode: InterfaceMode::Full,
        }
    }

    pub fn announce_interval(&self) -> Duration {
        self.peering_timeout / 6
    }

    pub fn peer_job_interval(&self) -> Duration {
        self.peering_timeout.mul_f64(1.1)
    }

    pub fn multicast_echo_timeout(&self) -> Duration {
        self.peering_timeout / 2
    }

    pub fn validate(&self) -> Result<(), InterfaceError> {
        if self.group_id.is_empty() {
            return Err(InterfaceError::Configuration(format!(
                "{}: group_id must not be empty",
                self.name
            )));
        }
        if self.discovery_port == 0 || self.data_port == 0 {
            return Err(InterfaceError::Configuration(format!(
                "{}: discovery_port and data_port must be non-zero",
                self.name
            )));
        }
        if self.discovery_port == self.data_port {
            return Err(InterfaceError::Configuration(format!(
                "{}: discovery_port and data_port must differ (both {})",
                self.name, self.data_port
            )));
        }
        if self.peering_timeout.is_zero() {
            return Err(InterfaceError::Configuration(format!(
                "{}: peering_timeout must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Refuse to run where link-local multicast discovery is unreliable.
pub fn ensure_platform_supported(os: &'static str) -> Result<(), InterfaceError> {
    if os == "windows" {
        error!(
            "AutoInterface is not currently supported on Windows, disabling interface. \
             Please remove this AutoInterface instance from your configuration file. \
             You will have to manually configure other interfaces for connectivity."
        );
        return Err(InterfaceError::UnsupportedPlatform(os));
    }
    Ok(())
}
