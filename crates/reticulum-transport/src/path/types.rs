//! Path table types.

use std::collections::VecDeque;
use std::sync::Arc;

use reticulum_core::{ConnectionInterface, DestinationHash, InterfaceMode};

use super::constants::*;

pub type RandomBlob = [u8; RANDOM_BLOB_LEN];

/// Path TTL for paths learned on an interface in `mode`.
pub fn path_ttl(mode: InterfaceMode) -> u64 {
    match mode {
        InterfaceMode::AccessPoint => AP_PATH_TIME,
        InterfaceMode::Roaming => ROAMING_PATH_TIME,
        InterfaceMode::Full
        | InterfaceMode::PointToPoint
        | InterfaceMode::Boundary
        | InterfaceMode::Gateway => PATHFINDER_E,
    }
}

/// A single entry in the path table.
#[derive(Debug, Clone)]
pub struct Hops {
    /// The node that relayed the announce to us, or the destination itself
    /// when it is directly reachable.
    pub via: DestinationHash,
    pub hops: u8,
    /// When the path was learned, in UNIX seconds.
    pub timestamp: u64,
    /// Absolute expiry, in UNIX seconds.
    pub expires: u64,
    random_blobs: VecDeque<RandomBlob>,
    pub source_interface: Arc<dyn ConnectionInterface>,
    /// The announce that produced this entry, kept for re-propagation.
    pub originating_packet: Vec<u8>,
}

impl Hops {
    /// Create a new entry with TTL computed from the source interface's mode.
    pub fn new(
        via: DestinationHash,
        hops: u8,
        timestamp: u64,
        source_interface: Arc<dyn ConnectionInterface>,
        originating_packet: Vec<u8>,
    ) -> Self {
        let expires = timestamp + path_ttl(source_interface.mode());
        Self {
            via,
            hops,
            timestamp,
            expires,
            random_blobs: VecDeque::new(),
            source_interface,
            originating_packet,
        }
    }

    /// Override the computed expiry.
    pub fn with_expires(mut self, expires: u64) -> Self {
        self.expires = expires;
        self
    }

    /// Record the announce nonce that produced this entry.
    pub fn with_random_blob(mut self, blob: RandomBlob) -> Self {
        self.add_random_blob(blob);
        self
    }

    pub fn random_blobs(&self) -> &VecDeque<RandomBlob> {
        &self.random_blobs
    }

    /// Uses strict `>`: an entry is still valid at `now == expires`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires
    }

    pub fn expire(&mut self) {
        self.expires = 0;
    }

    /// Whether `other` should replace `self` in the table.
    ///
    /// An expired entry is always replaceable. Otherwise only a strictly
    /// shorter path, or an equally long but newer one, wins.
    pub fn is_superseded_by(&self, other: &Hops, now: u64) -> bool {
        self.is_expired(now)
            || other.hops < self.hops
            || (other.hops == self.hops && other.timestamp > self.timestamp)
    }

    pub fn has_random_blob(&self, blob: &RandomBlob) -> bool {
        self.random_blobs.iter().any(|b| b == blob)
    }

    /// Add a random blob, dropping the oldest beyond [`MAX_RANDOM_BLOBS`].
    pub fn add_random_blob(&mut self, blob: RandomBlob) {
        if !self.has_random_blob(&blob) {
            if self.random_blobs.len() >= MAX_RANDOM_BLOBS {
                self.random_blobs.pop_front();
            }
            self.random_blobs.push_back(blob);
        }
    }

    /// Carry over the nonces already seen for this destination.
    pub(crate) fn inherit_random_blobs(&mut self, previous: &Hops) {
        let own = std::mem::take(&mut self.random_blobs);
        for blob in previous.random_blobs.iter().chain(own.iter()) {
            self.add_random_blob(*blob);
        }
    }

    /// Emission timebase: the largest 5-byte big-endian timestamp carried in
    /// bytes 5..10 of the random blobs.
    pub fn timebase_from_random_blobs(&self) -> u64 {
        self.random_blobs
            .iter()
            .map(|blob| {
                let mut bytes = [0u8; 8];
                bytes[3..8].copy_from_slice(&blob[5..10]);
                u64::from_be_bytes(bytes)
            })
            .max()
            .unwrap_or(0)
    }
}
