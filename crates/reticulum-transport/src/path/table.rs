//! Path table for destination routing.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use reticulum_core::{ConnectionInterface, DestinationHash, InterfaceId};

use super::types::{Hops, RandomBlob};

/// Best known path per destination.
///
/// Updates for one destination are serialized by the map's shard lock, so
/// the replacement rule in [`upsert`](Self::upsert) holds under concurrent
/// writers. Readers never see an entry past its expiry, whether or not
/// [`sweep_expired`](Self::sweep_expired) has run.
#[derive(Debug, Default)]
#[must_use]
pub struct PathTable {
    entries: DashMap<DestinationHash, Hops>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `hops` for `dest` unless a better live path is already known.
    ///
    /// Returns whether the table changed. A replacing entry keeps the random
    /// blobs seen for the destination so far.
    pub fn upsert(&self, dest: DestinationHash, mut hops: Hops, now: u64) -> bool {
        match self.entries.entry(dest) {
            Entry::Vacant(slot) => {
                slot.insert(hops);
                true
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if !current.is_superseded_by(&hops, now) {
                    return false;
                }
                if !current.is_expired(now) {
                    hops.inherit_random_blobs(current);
                }
                slot.insert(hops);
                true
            }
        }
    }

    /// The live path to `dest`. An expired entry is removed and not returned.
    #[must_use]
    pub fn lookup(&self, dest: &DestinationHash, now: u64) -> Option<Hops> {
        if let Some(entry) = self.entries.get(dest)
            && !entry.is_expired(now)
        {
            return Some(entry.clone());
        }
        self.entries.remove_if(dest, |_, e| e.is_expired(now));
        None
    }

    #[must_use]
    pub fn has_path(&self, dest: &DestinationHash, now: u64) -> bool {
        self.entries.get(dest).is_some_and(|e| !e.is_expired(now))
    }

    #[must_use]
    pub fn hops_to(&self, dest: &DestinationHash, now: u64) -> Option<u8> {
        self.entries
            .get(dest)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.hops)
    }

    /// Get the interface that the path was learned on.
    #[must_use]
    pub fn next_hop_interface(
        &self,
        dest: &DestinationHash,
        now: u64,
    ) -> Option<Arc<dyn ConnectionInterface>> {
        self.entries
            .get(dest)
            .filter(|e| !e.is_expired(now))
            .map(|e| Arc::clone(&e.source_interface))
    }

    /// Whether `blob` was already seen in an announce for `dest`.
    #[must_use]
    pub fn has_random_blob(&self, dest: &DestinationHash, blob: &RandomBlob) -> bool {
        self.entries
            .get(dest)
            .is_some_and(|e| e.has_random_blob(blob))
    }

    /// Force-expire a path. Returns true if the path existed.
    pub fn expire_path(&self, dest: &DestinationHash) -> bool {
        if let Some(mut entry) = self.entries.get_mut(dest) {
            entry.expire();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, dest: &DestinationHash) -> Option<Hops> {
        self.entries.remove(dest).map(|(_, e)| e)
    }

    /// Remove every path learned on `interface`. Returns the number removed.
    pub fn drop_interface(&self, interface: InterfaceId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.source_interface.id() != interface);
        before.saturating_sub(self.entries.len())
    }

    /// Remove every entry with `expires < now`. Returns the number removed.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Check if a destination exists in the table, regardless of expiry.
    #[must_use]
    pub fn contains(&self, dest: &DestinationHash) -> bool {
        self.entries.contains_key(dest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destinations(&self) -> Vec<DestinationHash> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}
