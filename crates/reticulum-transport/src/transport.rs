//! The transport context shared by discovery and link establishment.
//!
//! There is no global transport instance: a node builds one [`Transport`],
//! wraps it in an `Arc`, and hands clones to the components that need it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use reticulum_core::shutdown::stopped;
use reticulum_core::{ConnectionInterface, DestinationHash, InterfaceId, LinkId, ShutdownToken};
use reticulum_protocol::link::{Link, LinkRegistry, LinkTable, TeardownReason};
use reticulum_protocol::{LinkError, LinkEstablishment, LinkTimings};

use crate::clock::Clock;
use crate::error::PathError;
use crate::path::{Hops, PathTable};

/// Default interval between path table sweeps.
pub const DEFAULT_TABLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub table_sweep_interval: Duration,
    pub link_timings: LinkTimings,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            table_sweep_interval: DEFAULT_TABLE_SWEEP_INTERVAL,
            link_timings: LinkTimings::default(),
        }
    }
}

/// Owns the path table and the set of registered links.
pub struct Transport {
    config: TransportConfig,
    clock: Clock,
    paths: PathTable,
    links: LinkTable,
    shutdown: ShutdownToken,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Arc<Self> {
        Self::with_clock(config, Clock::new())
    }

    pub fn with_clock(config: TransportConfig, clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            paths: PathTable::new(),
            links: LinkTable::new(),
            shutdown: ShutdownToken::new(),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Current time in UNIX seconds.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// Link establishment that registers its links here.
    pub fn link_establishment(self: &Arc<Self>) -> LinkEstablishment {
        let registry: Arc<dyn LinkRegistry> = Arc::clone(self) as Arc<dyn LinkRegistry>;
        LinkEstablishment::new(registry, self.config.link_timings)
    }

    /// Record a path learned from an announce. Returns whether it was taken.
    pub fn learn_path(&self, dest: DestinationHash, hops: Hops) -> bool {
        let now = self.now();
        let hop_count = hops.hops;
        let interface = hops.source_interface.name().to_string();
        let changed = self.paths.upsert(dest, hops, now);
        if changed {
            debug!(destination = %dest, hops = hop_count, %interface, "path updated");
        }
        changed
    }

    /// The interface to reach `dest` through.
    pub fn route(&self, dest: &DestinationHash) -> Result<Arc<dyn ConnectionInterface>, PathError> {
        let now = self.now();
        let hops = match self.paths.lookup(dest, now) {
            Some(h) => h,
            None => return Err(PathError::NoPath(*dest)),
        };
        if !hops.source_interface.is_online() {
            return Err(PathError::InterfaceOffline {
                destination: *dest,
                interface: hops.source_interface.name().to_string(),
            });
        }
        Ok(hops.source_interface)
    }

    /// Forget everything learned through an interface that went away.
    pub fn interface_removed(&self, interface: InterfaceId) -> usize {
        let dropped = self.paths.drop_interface(interface);
        if dropped > 0 {
            info!(%interface, paths = dropped, "dropped paths for removed interface");
        }
        dropped
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        self.links.ids()
    }

    /// One sweep pass. Returns the number of paths removed.
    pub fn sweep(&self) -> usize {
        let removed = self.paths.sweep_expired(self.now());
        if removed > 0 {
            debug!(removed, remaining = self.paths.len(), "swept expired paths");
        }
        removed
    }

    /// Start the periodic table sweep.
    pub async fn start(self: &Arc<Self>) {
        let transport = Arc::clone(self);
        let mut stop = self.shutdown.subscribe();
        let period = self.config.table_sweep_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Don't fire immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        transport.sweep();
                    }
                    _ = stopped(&mut stop) => break,
                }
            }
            debug!("table sweep stopped");
        });
        self.shutdown.add_task(handle).await;
        self.shutdown.set_online();
    }

    /// Stop the sweep and close every link.
    pub async fn shutdown(&self) {
        let closed = self.links.close_all(TeardownReason::Shutdown);
        self.shutdown.shutdown().await;
        info!(links_closed = closed, "transport stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_online()
    }
}

impl LinkRegistry for Transport {
    fn register_link(&self, link: Arc<Link>) -> Result<(), LinkError> {
        let id = link.id();
        self.links.register_link(link)?;
        debug!(link_id = %id, links = self.links.link_count(), "link registered");
        Ok(())
    }

    fn deregister_link(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.links.deregister_link(id)
    }

    fn deregister_if(&self, link: &Arc<Link>) -> bool {
        self.links.deregister_if(link)
    }

    fn find_link(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.links.find_link(id)
    }

    fn link_count(&self) -> usize {
        self.links.link_count()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("paths", &self.paths.len())
            .field("links", &self.links.link_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticulum_core::testing::RecordingInterface;

    fn transport() -> Arc<Transport> {
        Transport::with_clock(TransportConfig::default(), Clock::starting_at(10_000))
    }

    fn hops(count: u8, iface: Arc<RecordingInterface>) -> Hops {
        Hops::new(DestinationHash::new([9; 16]), count, 10_000, iface, vec![])
    }

    #[tokio::test]
    async fn route_follows_learned_path() {
        let t = transport();
        let dest = DestinationHash::new([1; 16]);
        assert!(matches!(t.route(&dest), Err(PathError::NoPath(_))));

        let iface = Arc::new(RecordingInterface::new(3, "auto0"));
        assert!(t.learn_path(dest, hops(2, iface.clone())));
        assert_eq!(t.route(&dest).unwrap().id(), InterfaceId(3));

        iface.set_online(false);
        assert!(matches!(
            t.route(&dest),
            Err(PathError::InterfaceOffline { .. })
        ));
    }

    #[tokio::test]
    async fn removed_interface_takes_its_paths() {
        let t = transport();
        let iface = Arc::new(RecordingInterface::new(3, "auto0"));
        t.learn_path(DestinationHash::new([1; 16]), hops(1, iface.clone()));
        t.learn_path(DestinationHash::new([2; 16]), hops(1, iface));
        assert_eq!(t.interface_removed(InterfaceId(3)), 2);
        assert!(t.paths().is_empty());
    }
}
