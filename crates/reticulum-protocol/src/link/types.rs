//! Shared link types.

use std::fmt;
use std::time::Duration;

use super::constants::{
    DERIVED_KEY_SIZE, ESTABLISHMENT_TIMEOUT_PER_HOP, KEEPALIVE_DEFAULT, STALE_FACTOR, STALE_GRACE,
};

/// Which side of the handshake this node played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Responder,
}

/// Lifecycle position of a link. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkStatus {
    Pending,
    Handshaking,
    Active,
    Stale,
    Closed,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Handshaking => "handshaking",
            LinkStatus::Active => "active",
            LinkStatus::Stale => "stale",
            LinkStatus::Closed => "closed",
        }
    }

    /// The single state that follows this one in the normal lifecycle.
    pub fn next(&self) -> Option<LinkStatus> {
        match self {
            LinkStatus::Pending => Some(LinkStatus::Handshaking),
            LinkStatus::Handshaking => Some(LinkStatus::Active),
            LinkStatus::Active => Some(LinkStatus::Stale),
            LinkStatus::Stale => Some(LinkStatus::Closed),
            LinkStatus::Closed => None,
        }
    }

    /// Whether `self -> to` is a legal transition: the next lifecycle state,
    /// or closing from any live state.
    pub fn can_transition_to(&self, to: LinkStatus) -> bool {
        self.next() == Some(to) || (to == LinkStatus::Closed && *self != LinkStatus::Closed)
    }

    pub fn is_established(&self) -> bool {
        matches!(self, LinkStatus::Active | LinkStatus::Stale)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a link reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The handshake did not complete within the establishment timeout.
    EstablishmentTimeout,
    /// No inbound traffic for the inactivity bound plus the stale grace.
    Inactivity,
    InitiatorClosed,
    DestinationClosed,
    /// The owning transport shut down.
    Shutdown,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TeardownReason::EstablishmentTimeout => "establishment timeout",
            TeardownReason::Inactivity => "inactivity",
            TeardownReason::InitiatorClosed => "closed by initiator",
            TeardownReason::DestinationClosed => "closed by destination",
            TeardownReason::Shutdown => "shutdown",
        })
    }
}

/// Traffic counters for a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

/// The 64-byte HKDF output that keys a link's [`Token`](reticulum_crypto::Token).
#[must_use]
pub struct DerivedKey([u8; DERIVED_KEY_SIZE]);

impl DerivedKey {
    pub fn new(bytes: [u8; DERIVED_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// Timing policy applied to every link created by one establishment context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    pub establishment_per_hop: Duration,
    pub keepalive: Duration,
    pub stale_grace: Duration,
}

impl LinkTimings {
    /// Time allowed from request to activation: the per-hop allowance times
    /// the hop count, which is floored at one.
    pub fn establishment_timeout(&self, hops: u8) -> Duration {
        self.establishment_per_hop * u32::from(hops.max(1))
    }

    /// Inactivity bound after which an active link goes stale.
    pub fn stale_time(&self) -> Duration {
        self.keepalive * STALE_FACTOR
    }
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            establishment_per_hop: ESTABLISHMENT_TIMEOUT_PER_HOP,
            keepalive: KEEPALIVE_DEFAULT,
            stale_grace: STALE_GRACE,
        }
    }
}
