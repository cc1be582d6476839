//! Peer tracking, multicast echo bookkeeping and packet deduplication for
//! the Auto interface.
//!
//! All types here are pure logic (no I/O); time is passed in.

use std::collections::VecDeque;
use std::net::Ipv6Addr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::{MULTI_IF_DEQUE_LEN, MULTI_IF_DEQUE_TTL};

/// A discovered peer on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Peer's IPv6 link-local address.
    pub addr: Ipv6Addr,
    /// OS interface name the peer was discovered on.
    pub ifname: String,
    /// OS interface index.
    pub if_index: u32,
    /// When we last heard from this peer (discovery or data).
    pub last_heard: Instant,
}

impl Peer {
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heard) > timeout
    }
}

/// Known peers, keyed by address.
///
/// Listener tasks on every adopted interface write here concurrently; the
/// map's shard locks serialize updates per address. Lookups never return a
/// peer that has been silent for longer than the peering timeout, even
/// before the peer job prunes it.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: DashMap<Ipv6Addr, Peer>,
    echoes: DashMap<String, Instant>,
    dedup: Mutex<DedupRing>,
    timeout: Duration,
}

impl PeerRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: DashMap::new(),
            echoes: DashMap::new(),
            dedup: Mutex::new(DedupRing::new(MULTI_IF_DEQUE_LEN, MULTI_IF_DEQUE_TTL)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Add a new peer or refresh an existing one.
    ///
    /// Returns `true` if this is a newly discovered peer.
    pub fn upsert(&self, addr: Ipv6Addr, ifname: &str, if_index: u32, now: Instant) -> bool {
        let mut is_new = true;
        self.peers
            .entry(addr)
            .and_modify(|peer| {
                is_new = peer.is_timed_out(now, self.timeout);
                peer.ifname = ifname.to_string();
                peer.if_index = if_index;
                peer.last_heard = now;
            })
            .or_insert_with(|| Peer {
                addr,
                ifname: ifname.to_string(),
                if_index,
                last_heard: now,
            });
        is_new
    }

    /// Refresh a known peer on inbound data. Unknown senders are ignored.
    pub fn refresh(&self, addr: &Ipv6Addr, now: Instant) -> bool {
        match self.peers.get_mut(addr) {
            Some(mut peer) if !peer.is_timed_out(now, self.timeout) => {
                peer.last_heard = now;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, addr: &Ipv6Addr, now: Instant) -> Option<Peer> {
        self.peers
            .get(addr)
            .filter(|p| !p.is_timed_out(now, self.timeout))
            .map(|p| p.value().clone())
    }

    /// Live peers heard on `ifname`.
    pub fn peers_on(&self, ifname: &str, now: Instant) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|p| p.ifname == ifname && !p.is_timed_out(now, self.timeout))
            .map(|p| p.value().clone())
            .collect()
    }

    pub fn count_on(&self, ifname: &str, now: Instant) -> usize {
        self.peers
            .iter()
            .filter(|p| p.ifname == ifname && !p.is_timed_out(now, self.timeout))
            .count()
    }

    /// Remove every peer silent for longer than the peering timeout.
    pub fn prune(&self, now: Instant) -> Vec<Peer> {
        self.remove_where(|p| p.is_timed_out(now, self.timeout))
    }

    /// Remove every peer heard on `ifname`.
    pub fn drop_interface(&self, ifname: &str) -> Vec<Peer> {
        self.echoes.remove(ifname);
        self.remove_where(|p| p.ifname == ifname)
    }

    fn remove_where(&self, doomed: impl Fn(&Peer) -> bool) -> Vec<Peer> {
        let addrs: Vec<Ipv6Addr> = self
            .peers
            .iter()
            .filter(|p| doomed(p.value()))
            .map(|p| *p.key())
            .collect();
        addrs
            .iter()
            .filter_map(|addr| self.peers.remove_if(addr, |_, p| doomed(p)))
            .map(|(_, peer)| peer)
            .collect()
    }

    /// Note that our own announce came back on `ifname`.
    pub fn record_echo(&self, ifname: &str, now: Instant) {
        self.echoes.insert(ifname.to_string(), now);
    }

    pub fn last_echo(&self, ifname: &str) -> Option<Instant> {
        self.echoes.get(ifname).map(|e| *e)
    }

    /// Check if data has been seen recently on any interface.
    ///
    /// Returns `true` if this is a duplicate. If not a duplicate, records it.
    pub fn is_duplicate(&self, data_hash: [u8; 32], now: Instant) -> bool {
        self.dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check_and_insert(data_hash, now)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Fixed-size ring buffer for packet deduplication.
///
/// Entries expire after `ttl` and are evicted when the buffer is full.
#[derive(Debug)]
struct DedupRing {
    entries: VecDeque<([u8; 32], Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl DedupRing {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
        }
    }

    /// Returns `true` if `hash` is already in the buffer and not expired.
    fn check_and_insert(&mut self, hash: [u8; 32], now: Instant) -> bool {
        self.entries
            .retain(|(_, ts)| now.saturating_duration_since(*ts) <= self.ttl);

        if self.entries.iter().any(|(h, _)| *h == hash) {
            return true;
        }

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((hash, now));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::PEERING_TIMEOUT;
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn peer_add_and_refresh() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();

        assert!(registry.upsert(addr("fe80::1"), "en0", 1, now));
        assert_eq!(registry.len(), 1);

        let later = now + Duration::from_secs(5);
        assert!(!registry.upsert(addr("fe80::1"), "en0", 1, later));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&addr("fe80::1"), later).unwrap().last_heard,
            later
        );
    }

    #[test]
    fn silent_peer_is_hidden_then_pruned() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();
        registry.upsert(addr("fe80::1"), "en0", 1, now);
        registry.upsert(addr("fe80::2"), "en0", 1, now + Duration::from_secs(20));

        let at_bound = now + PEERING_TIMEOUT;
        assert!(registry.get(&addr("fe80::1"), at_bound).is_some());
        assert!(registry.prune(at_bound).is_empty());

        let past = at_bound + Duration::from_millis(1);
        assert!(registry.get(&addr("fe80::1"), past).is_none());
        assert_eq!(registry.count_on("en0", past), 1);

        let removed = registry.prune(past);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].addr, addr("fe80::1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rediscovered_peer_counts_as_new() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();
        registry.upsert(addr("fe80::1"), "en0", 1, now);
        let much_later = now + PEERING_TIMEOUT * 2;
        assert!(registry.upsert(addr("fe80::1"), "en0", 1, much_later));
    }

    #[test]
    fn refresh_only_touches_live_peers() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();
        assert!(!registry.refresh(&addr("fe80::9"), now));
        registry.upsert(addr("fe80::1"), "en0", 1, now);
        assert!(registry.refresh(&addr("fe80::1"), now + Duration::from_secs(10)));
        assert!(!registry.refresh(&addr("fe80::1"), now + Duration::from_secs(60)));
    }

    #[test]
    fn peers_are_tracked_per_interface() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();
        registry.upsert(addr("fe80::1"), "en0", 1, now);
        registry.upsert(addr("fe80::2"), "en1", 2, now);
        registry.upsert(addr("fe80::3"), "en1", 2, now);

        assert_eq!(registry.peers_on("en1", now).len(), 2);
        let dropped = registry.drop_interface("en1");
        assert_eq!(dropped.len(), 2);
        assert_eq!(registry.count_on("en1", now), 0);
        assert_eq!(registry.count_on("en0", now), 1);
    }

    #[test]
    fn echoes_are_per_interface() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();
        assert!(registry.last_echo("en0").is_none());
        registry.record_echo("en0", now);
        assert_eq!(registry.last_echo("en0"), Some(now));
        assert!(registry.last_echo("en1").is_none());
        registry.drop_interface("en0");
        assert!(registry.last_echo("en0").is_none());
    }

    #[test]
    fn dedup_detects_duplicates() {
        let registry = PeerRegistry::new(PEERING_TIMEOUT);
        let now = Instant::now();

        assert!(!registry.is_duplicate([0xAA; 32], now));
        assert!(registry.is_duplicate([0xAA; 32], now));
        assert!(!registry.is_duplicate([0xBB; 32], now));
    }

    #[test]
    fn dedup_ring_eviction() {
        let mut ring = DedupRing::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(!ring.check_and_insert([1; 32], now));
        assert!(!ring.check_and_insert([2; 32], now));
        assert!(!ring.check_and_insert([3; 32], now));

        // Buffer full, [1] is evicted when [4] is inserted.
        assert!(!ring.check_and_insert([4; 32], now));
        assert_eq!(ring.entries.len(), 3);
        assert!(!ring.check_and_insert([1; 32], now));
    }

    #[test]
    fn dedup_ring_expiry() {
        let mut ring = DedupRing::new(48, MULTI_IF_DEQUE_TTL);
        let now = Instant::now();
        assert!(!ring.check_and_insert([0xCC; 32], now));
        assert!(ring.check_and_insert([0xCC; 32], now + MULTI_IF_DEQUE_TTL));
        let later = now + MULTI_IF_DEQUE_TTL * 3;
        assert!(!ring.check_and_insert([0xCC; 32], later));
    }
}
