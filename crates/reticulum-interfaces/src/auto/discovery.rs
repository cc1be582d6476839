//! Multicast address derivation and discovery token generation/verification.
//!
//! The multicast address is derived from the SHA-256 hash of the group ID.
//! The discovery token is SHA-256(group_id || link_local_addr_utf8).

use std::net::Ipv6Addr;
use std::sync::OnceLock;

use tokio::time::Instant;
use tracing::{debug, info};

use reticulum_crypto::{sha256, sha256_concat};

use super::DiscoveryScope;
use super::netif::LocalInterface;
use super::peer::PeerRegistry;
use crate::error::InterfaceError;

/// Length of a discovery token on the wire.
pub const TOKEN_LEN: usize = 32;

/// The six 16-bit groups taken from `SHA-256(group_id)`, bytes 2..14.
fn hash_segments(group_id: &str) -> [u16; 6] {
    let g = sha256(group_id.as_bytes());
    let mut segments = [0u16; 6];
    for (k, offset) in (2..14).step_by(2).enumerate() {
        segments[k] = u16::from(g[offset + 1]) + (u16::from(g[offset]) << 8);
    }
    segments
}

/// Render the multicast discovery address for a group.
///
/// ```text
/// g = SHA-256(group_id)
/// address = ff1{scope}:0:{g[2]g[3]}:{g[4]g[5]}:...:{g[12]g[13]}
/// ```
///
/// Segments are rendered as `{:02x}`, so a segment below 0x100 has two
/// digits rather than four. Every rendering is a valid IPv6 literal.
pub fn multicast_address_string(group_id: &str, scope: DiscoveryScope) -> String {
    let mut address = format!("ff1{}:0", scope.as_hex_char());
    for segment in hash_segments(group_id) {
        address.push_str(&format!(":{segment:02x}"));
    }
    address
}

/// Binary form of [`multicast_address_string`].
pub fn multicast_address(group_id: &str, scope: DiscoveryScope) -> Ipv6Addr {
    let s = hash_segments(group_id);
    Ipv6Addr::new(0xff10 | u16::from(scope.nibble()), 0, s[0], s[1], s[2], s[3], s[4], s[5])
}

/// Generate a 32-byte discovery token for announcing presence.
///
/// `token = SHA-256(group_id || link_local_addr_string)`
pub fn discovery_token(group_id: &str, link_local_addr: &str) -> [u8; TOKEN_LEN] {
    sha256_concat(&[group_id.as_bytes(), link_local_addr.as_bytes()])
}

/// Verify a received discovery token against the address it came from.
pub fn verify_discovery_token(payload: &[u8], group_id: &str, sender_addr: &str) -> bool {
    payload.len() == TOKEN_LEN && payload == discovery_token(group_id, sender_addr)
}

/// What the listener did with one discovery datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    PeerAdded,
    PeerRefreshed,
    /// Our own announce, looped back by the network.
    OwnEcho,
    Rejected,
}

/// A discovery group: group identifier plus scope, with the derived
/// multicast address computed once.
#[derive(Debug)]
pub struct MulticastGroup {
    group_id: String,
    scope: DiscoveryScope,
    address: OnceLock<(String, Ipv6Addr)>,
}

impl MulticastGroup {
    pub fn new(group_id: impl Into<String>, scope: DiscoveryScope) -> Self {
        Self {
            group_id: group_id.into(),
            scope,
            address: OnceLock::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn scope(&self) -> DiscoveryScope {
        self.scope
    }

    fn cached(&self) -> &(String, Ipv6Addr) {
        self.address.get_or_init(|| {
            (
                multicast_address_string(&self.group_id, self.scope),
                multicast_address(&self.group_id, self.scope),
            )
        })
    }

    /// The multicast address as configured peers render it.
    pub fn address_string(&self) -> &str {
        &self.cached().0
    }

    pub fn address(&self) -> Ipv6Addr {
        self.cached().1
    }

    /// Token announced from `local`.
    pub fn token_for(&self, local: &LocalInterface) -> [u8; TOKEN_LEN] {
        discovery_token(&self.group_id, &local.address_string())
    }

    /// Check a datagram's token against its sender.
    pub fn authenticate(
        &self,
        payload: &[u8],
        sender: Ipv6Addr,
        ifname: &str,
    ) -> Result<(), InterfaceError> {
        let sender = sender.to_string();
        if verify_discovery_token(payload, &self.group_id, &sender) {
            Ok(())
        } else {
            Err(InterfaceError::AuthenticationFailed {
                sender,
                ifname: ifname.to_string(),
            })
        }
    }

    /// Apply one received discovery datagram to `peers`.
    ///
    /// Only a token that verifies against the sender's own address counts.
    /// A verified datagram from our own address on `local` is a multicast
    /// echo and is recorded as such instead of as a peer.
    pub fn handle_datagram(
        &self,
        peers: &PeerRegistry,
        local: &LocalInterface,
        payload: &[u8],
        sender: Ipv6Addr,
        now: Instant,
    ) -> DiscoveryOutcome {
        if let Err(e) = self.authenticate(payload, sender, &local.name) {
            debug!(
                ifname = %local.name,
                %sender,
                len = payload.len(),
                error = %e,
                "peering packet rejected, authentication hash was incorrect"
            );
            return DiscoveryOutcome::Rejected;
        }

        if sender == local.addr {
            peers.record_echo(&local.name, now);
            return DiscoveryOutcome::OwnEcho;
        }

        if peers.upsert(sender, &local.name, local.index, now) {
            info!(ifname = %local.name, peer = %sender, "discovered peer");
            DiscoveryOutcome::PeerAdded
        } else {
            DiscoveryOutcome::PeerRefreshed
        }
    }
}
