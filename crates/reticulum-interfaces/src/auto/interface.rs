//! `AutoInterface`: discovery and data transport over IPv6 link-local multicast.
//!
//! Every adopted OS interface gets its own bundle of background tasks
//! (announcer, listener, data receiver, data transmitter) under its own
//! [`ShutdownToken`], so one interface can be torn down and restarted without
//! disturbing the others. A single peer job per `AutoInterface` prunes silent
//! peers, tracks carrier and multicast echo, and reconciles the adopted set
//! against a fresh interface enumeration.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use reticulum_core::shutdown::stopped;
use reticulum_core::{ConnectionInterface, InterfaceId, InterfaceMode, SendError, ShutdownToken};
use reticulum_crypto::sha256;

use super::discovery::{DiscoveryOutcome, MulticastGroup};
use super::netif::{InterfaceSource, LocalInterface, Platform, Selection, SystemInterfaces, select};
use super::peer::PeerRegistry;
use super::sockets;
use super::{AutoConfig, HW_MTU, OUTBOUND_QUEUE, RECV_BUFFER, ensure_platform_supported};
use crate::error::InterfaceError;

/// Frames buffered for the owner of the inbound channel.
const INBOUND_QUEUE: usize = 256;

/// A unicast data frame received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// OS interface the frame arrived on.
    pub ifname: String,
    pub source: SocketAddrV6,
    pub data: Vec<u8>,
}

/// What a re-enumeration changes in the adopted set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Newly eligible interfaces.
    pub adopt: Vec<LocalInterface>,
    /// Interfaces whose address or index changed, with their new identity.
    pub restart: Vec<LocalInterface>,
    /// Interfaces that are gone or no longer eligible.
    pub remove: Vec<String>,
}

impl Reconciliation {
    /// Compare the currently adopted interfaces with a fresh selection.
    pub fn plan<'a>(
        adopted: impl IntoIterator<Item = &'a LocalInterface>,
        selected: &[LocalInterface],
    ) -> Self {
        let adopted: HashMap<&str, &LocalInterface> =
            adopted.into_iter().map(|l| (l.name.as_str(), l)).collect();
        let mut plan = Reconciliation::default();
        for local in selected {
            match adopted.get(local.name.as_str()) {
                None => plan.adopt.push(local.clone()),
                Some(current) if *current != local => plan.restart.push(local.clone()),
                Some(_) => {}
            }
        }
        let mut remove: Vec<String> = adopted
            .keys()
            .filter(|name| !selected.iter().any(|l| l.name == **name))
            .map(|name| name.to_string())
            .collect();
        remove.sort();
        plan.remove = remove;
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.adopt.is_empty() && self.restart.is_empty() && self.remove.is_empty()
    }
}

/// One adopted OS interface and the tasks serving it.
struct Adopted {
    local: LocalInterface,
    /// Online flag doubles as the carrier: set on adoption and on new
    /// peers, cleared by the peer job when no peers remain.
    tasks: Arc<ShutdownToken>,
    outbound: mpsc::Sender<Vec<u8>>,
    adopted_at: Instant,
    echo_lost: AtomicBool,
}

/// Auto interface with multicast discovery and unicast UDP data transport.
pub struct AutoInterface {
    config: AutoConfig,
    id: InterfaceId,
    display_name: String,
    group: Arc<MulticastGroup>,
    peers: Arc<PeerRegistry>,
    source: Arc<dyn InterfaceSource>,
    adopted: RwLock<HashMap<String, Adopted>>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundFrame>>>,
    jobs: ShutdownToken,
}

impl AutoInterface {
    /// Create an interface that enumerates the host's network interfaces.
    pub fn new(config: AutoConfig, id: InterfaceId) -> Arc<Self> {
        Self::with_source(config, id, Arc::new(SystemInterfaces))
    }

    pub fn with_source(
        config: AutoConfig,
        id: InterfaceId,
        source: Arc<dyn InterfaceSource>,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        Arc::new(Self {
            display_name: format!("AutoInterface[{}]", config.name),
            group: Arc::new(MulticastGroup::new(
                config.group_id.clone(),
                config.discovery_scope,
            )),
            peers: Arc::new(PeerRegistry::new(config.peering_timeout)),
            config,
            id,
            source,
            adopted: RwLock::new(HashMap::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            jobs: ShutdownToken::new(),
        })
    }

    pub fn config(&self) -> &AutoConfig {
        &self.config
    }

    pub fn group(&self) -> &MulticastGroup {
        &self.group
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Take the receiving end of the inbound data channel. Only the first
    /// caller gets it.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<InboundFrame>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Interfaces currently adopted, sorted by name.
    pub fn adopted_interfaces(&self) -> Vec<LocalInterface> {
        let mut locals: Vec<LocalInterface> = self
            .adopted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|a| a.local.clone())
            .collect();
        locals.sort_by(|a, b| a.name.cmp(&b.name));
        locals
    }

    /// Whether the adopted interface `ifname` currently has carrier.
    pub fn carrier(&self, ifname: &str) -> bool {
        self.adopted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ifname)
            .is_some_and(|a| a.tasks.is_online())
    }

    /// Enable discovery.
    ///
    /// Fails on unsupported platforms and invalid configuration; the caller
    /// is expected to disable this interface and carry on. An OS interface
    /// whose sockets cannot be opened is skipped, not fatal.
    pub async fn start(self: &Arc<Self>) -> Result<(), InterfaceError> {
        ensure_platform_supported(std::env::consts::OS)?;
        self.config.validate()?;
        if self.jobs.is_stopped() {
            return Err(InterfaceError::Stopped);
        }

        info!(
            name = %self.display_name,
            group = %self.group.address_string(),
            scope = %self.group.scope(),
            discovery_port = self.config.discovery_port,
            data_port = self.config.data_port,
            "starting auto interface"
        );

        let selected = self.eligible_interfaces()?;
        if selected.is_empty() {
            warn!(
                name = %self.display_name,
                "no eligible network interfaces, waiting for one to appear"
            );
        }
        for local in selected {
            self.adopt_or_log(local).await;
        }

        let handle = tokio::spawn(peer_job_loop(
            Arc::downgrade(self),
            self.config.peer_job_interval(),
            self.jobs.subscribe(),
        ));
        self.jobs.add_task(handle).await;
        self.jobs.set_online();
        Ok(())
    }

    /// Stop the peer job and every adopted interface's tasks.
    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
        let adopted: Vec<Adopted> = self
            .adopted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, a)| a)
            .collect();
        for a in &adopted {
            a.tasks.shutdown().await;
        }
        info!(
            name = %self.display_name,
            interfaces = adopted.len(),
            "auto interface stopped"
        );
    }

    fn eligible_interfaces(&self) -> Result<Vec<LocalInterface>, InterfaceError> {
        let candidates = self.source.enumerate()?;
        let selection = Selection {
            platform: Platform::current(),
            devices: &self.config.devices,
            ignored: &self.config.ignored_interfaces,
        };
        Ok(select(&candidates, &selection))
    }

    async fn adopt_or_log(&self, local: LocalInterface) {
        let name = local.name.clone();
        if let Err(e) = self.adopt(local).await {
            warn!(
                name = %self.display_name,
                ifname = %name,
                error = %e,
                "could not adopt interface"
            );
        }
    }

    /// Open the sockets for `local` and spawn its tasks.
    async fn adopt(&self, local: LocalInterface) -> Result<(), InterfaceError> {
        let group = self.group.address();
        let listener = sockets::discovery_listener(
            group,
            self.group.scope(),
            self.config.discovery_port,
            &local,
        )?;
        let announcer = sockets::announcer(&local)?;
        let data = Arc::new(sockets::data(&local, self.config.data_port)?);

        let tasks = Arc::new(ShutdownToken::new());
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let handles = [
            tokio::spawn(announce_loop(
                announcer,
                Arc::clone(&self.group),
                local.clone(),
                self.config.discovery_port,
                self.config.announce_interval(),
                tasks.subscribe(),
            )),
            tokio::spawn(listen_loop(
                listener,
                Arc::clone(&self.group),
                Arc::clone(&self.peers),
                local.clone(),
                Arc::clone(&tasks),
            )),
            tokio::spawn(receive_loop(
                Arc::clone(&data),
                Arc::clone(&self.peers),
                local.name.clone(),
                self.inbound_tx.clone(),
                tasks.subscribe(),
            )),
            tokio::spawn(transmit_loop(
                data,
                Arc::clone(&self.peers),
                local.clone(),
                self.config.data_port,
                outbound_rx,
                tasks.subscribe(),
            )),
        ];
        for handle in handles {
            tasks.add_task(handle).await;
        }
        tasks.set_online();

        info!(
            name = %self.display_name,
            ifname = %local.name,
            addr = %local.addr,
            index = local.index,
            "adopted interface"
        );
        let previous = self
            .adopted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                local.name.clone(),
                Adopted {
                    local,
                    tasks,
                    outbound,
                    adopted_at: Instant::now(),
                    echo_lost: AtomicBool::new(false),
                },
            );
        if let Some(previous) = previous {
            previous.tasks.shutdown().await;
        }
        Ok(())
    }

    /// Stop the tasks of `ifname` and forget it. Returns its last identity.
    async fn release(&self, ifname: &str) -> Option<LocalInterface> {
        let adopted = self
            .adopted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ifname)?;
        adopted.tasks.shutdown().await;
        Some(adopted.local)
    }

    /// One pass of the peer job at `now`.
    pub async fn run_peer_job(&self, now: Instant) {
        for peer in self.peers.prune(now) {
            info!(
                name = %self.display_name,
                peer = %peer.addr,
                ifname = %peer.ifname,
                "peer timed out"
            );
        }

        self.check_carrier(now);

        match self.eligible_interfaces() {
            Ok(selected) => self.apply(&selected).await,
            Err(e) => warn!(name = %self.display_name, error = %e, "interface enumeration failed"),
        }
    }

    fn check_carrier(&self, now: Instant) {
        let echo_timeout = self.config.multicast_echo_timeout();
        let adopted = self.adopted.read().unwrap_or_else(PoisonError::into_inner);
        for (ifname, a) in adopted.iter() {
            if self.peers.count_on(ifname, now) == 0 && a.tasks.is_online() {
                info!(name = %self.display_name, %ifname, "no peers left, interface offline");
                a.tasks.set_offline();
            }

            let echo_seen = match self.peers.last_echo(ifname) {
                Some(at) => now.saturating_duration_since(at) <= echo_timeout,
                None => now.saturating_duration_since(a.adopted_at) <= echo_timeout,
            };
            let was_lost = a.echo_lost.swap(!echo_seen, Ordering::SeqCst);
            if !echo_seen && !was_lost {
                warn!(
                    name = %self.display_name,
                    %ifname,
                    timeout = ?echo_timeout,
                    "no multicast echo received, check the system firewall and multicast routing"
                );
            } else if echo_seen && was_lost {
                info!(name = %self.display_name, %ifname, "multicast echo restored");
            }
        }
    }

    async fn apply(&self, selected: &[LocalInterface]) {
        let plan = {
            let adopted = self.adopted.read().unwrap_or_else(PoisonError::into_inner);
            Reconciliation::plan(adopted.values().map(|a| &a.local), selected)
        };
        if plan.is_empty() {
            return;
        }

        for ifname in &plan.remove {
            self.release(ifname).await;
            let dropped = self.peers.drop_interface(ifname);
            info!(
                name = %self.display_name,
                %ifname,
                peers_dropped = dropped.len(),
                "interface gone, released"
            );
        }
        for local in plan.restart {
            let old = self.release(&local.name).await;
            info!(
                name = %self.display_name,
                ifname = %local.name,
                old = ?old.map(|o| o.addr),
                new = %local.addr,
                "interface address changed, restarting"
            );
            self.adopt_or_log(local).await;
        }
        for local in plan.adopt {
            self.adopt_or_log(local).await;
        }
    }
}

impl std::fmt::Debug for AutoInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoInterface")
            .field("id", &self.id)
            .field("name", &self.display_name)
            .field("group", &self.group.address_string())
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl ConnectionInterface for AutoInterface {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.display_name
    }

    fn mode(&self) -> InterfaceMode {
        self.config.mode
    }

    fn is_online(&self) -> bool {
        !self.jobs.is_stopped()
            && self
                .adopted
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .any(|a| a.tasks.is_online())
    }

    fn send(&self, frame: &[u8]) -> Result<(), SendError> {
        if frame.len() > HW_MTU {
            return Err(SendError::TooLarge {
                size: frame.len(),
                mtu: HW_MTU,
            });
        }
        if self.jobs.is_stopped() {
            return Err(SendError::Stopped(self.display_name.clone()));
        }

        let adopted = self.adopted.read().unwrap_or_else(PoisonError::into_inner);
        let mut queued = false;
        let mut full = false;
        for a in adopted.values() {
            match a.outbound.try_send(frame.to_vec()) {
                Ok(()) => queued = true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(ifname = %a.local.name, "outbound queue full, frame dropped");
                    full = true;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        match (queued, full) {
            (true, _) => Ok(()),
            (false, true) => Err(SendError::Io("outbound queues full".to_string())),
            (false, false) => Err(SendError::Offline(self.display_name.clone())),
        }
    }
}

async fn peer_job_loop(
    iface: Weak<AutoInterface>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Don't fire immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(iface) = iface.upgrade() else { break };
                iface.run_peer_job(Instant::now()).await;
            }
            _ = stopped(&mut stop) => break,
        }
    }
    debug!("peer job stopped");
}

/// Join, send the token, leave. The group membership lasts one datagram.
async fn announce_once(
    socket: &UdpSocket,
    group: &MulticastGroup,
    local: &LocalInterface,
    token: &[u8],
    dest: SocketAddrV6,
) -> std::io::Result<()> {
    socket.join_multicast_v6(&group.address(), local.index)?;
    let sent = socket.send_to(token, dest).await;
    if let Err(e) = socket.leave_multicast_v6(&group.address(), local.index) {
        trace!(ifname = %local.name, error = %e, "leaving multicast group failed");
    }
    sent.map(|_| ())
}

async fn announce_loop(
    socket: UdpSocket,
    group: Arc<MulticastGroup>,
    local: LocalInterface,
    port: u16,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let token = group.token_for(&local);
    let dest = SocketAddrV6::new(group.address(), port, 0, local.index);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match announce_once(&socket, &group, &local, &token, dest).await {
                    Ok(()) => trace!(ifname = %local.name, "sent discovery announce"),
                    Err(e) => warn!(ifname = %local.name, error = %e, "discovery announce failed"),
                }
            }
            _ = stopped(&mut stop) => break,
        }
    }
    debug!(ifname = %local.name, "announcer stopped");
}

async fn listen_loop(
    socket: UdpSocket,
    group: Arc<MulticastGroup>,
    peers: Arc<PeerRegistry>,
    local: LocalInterface,
    tasks: Arc<ShutdownToken>,
) {
    let mut stop = tasks.subscribe();
    let mut buf = vec![0u8; RECV_BUFFER];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((n, SocketAddr::V6(src))) => {
                    let outcome =
                        group.handle_datagram(&peers, &local, &buf[..n], *src.ip(), Instant::now());
                    if outcome == DiscoveryOutcome::PeerAdded && !tasks.is_stopped() {
                        tasks.set_online();
                    }
                }
                Ok((_, SocketAddr::V4(src))) => {
                    trace!(ifname = %local.name, %src, "ignoring IPv4 datagram");
                }
                Err(e) => warn!(ifname = %local.name, error = %e, "discovery receive failed"),
            },
            _ = stopped(&mut stop) => break,
        }
    }
    debug!(ifname = %local.name, "listener stopped");
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    peers: Arc<PeerRegistry>,
    ifname: String,
    inbound: mpsc::Sender<InboundFrame>,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RECV_BUFFER];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((n, SocketAddr::V6(src))) => {
                    let data = &buf[..n];
                    let now = Instant::now();
                    // A frame reaching us over several adopted interfaces is
                    // delivered once.
                    if peers.is_duplicate(sha256(data), now) {
                        trace!(%ifname, len = n, "duplicate frame dropped");
                        continue;
                    }
                    peers.refresh(src.ip(), now);
                    let frame = InboundFrame {
                        ifname: ifname.clone(),
                        source: src,
                        data: data.to_vec(),
                    };
                    if let Err(e) = inbound.try_send(frame) {
                        debug!(%ifname, error = %e, "inbound frame dropped");
                    }
                }
                Ok((_, SocketAddr::V4(_))) => {}
                Err(e) => warn!(%ifname, error = %e, "data receive failed"),
            },
            _ = stopped(&mut stop) => break,
        }
    }
    debug!(%ifname, "data receiver stopped");
}

async fn transmit_loop(
    socket: Arc<UdpSocket>,
    peers: Arc<PeerRegistry>,
    local: LocalInterface,
    port: u16,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                for peer in peers.peers_on(&local.name, Instant::now()) {
                    let dest = sockets::peer_endpoint(peer.addr, port, &local);
                    if let Err(e) = socket.send_to(&frame, dest).await {
                        warn!(ifname = %local.name, peer = %peer.addr, error = %e, "data send failed");
                    }
                }
            }
            _ = stopped(&mut stop) => break,
        }
    }
    debug!(ifname = %local.name, "data transmitter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto::netif::NetInterface;

    fn local(name: &str, index: u32, addr: &str) -> LocalInterface {
        LocalInterface {
            name: name.to_string(),
            index,
            addr: addr.parse().unwrap(),
        }
    }

    /// A host with no usable interfaces: only loopback.
    struct LoopbackOnly;

    impl InterfaceSource for LoopbackOnly {
        fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError> {
            Ok(vec![NetInterface {
                name: "lo".into(),
                index: 1,
                loopback: true,
                link_local: None,
            }])
        }
    }

    struct Broken;

    impl InterfaceSource for Broken {
        fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError> {
            Err(InterfaceError::Enumeration("no netlink".into()))
        }
    }

    fn auto(source: Arc<dyn InterfaceSource>) -> Arc<AutoInterface> {
        AutoInterface::with_source(AutoConfig::new("auto0"), InterfaceId(4), source)
    }

    #[test]
    fn plan_detects_new_changed_and_gone_interfaces() {
        let adopted = [
            local("eth0", 2, "fe80::2"),
            local("eth1", 3, "fe80::3"),
            local("wlan0", 4, "fe80::4"),
        ];
        let selected = [
            local("eth0", 2, "fe80::2"),
            local("eth1", 3, "fe80::33"),
            local("eth2", 5, "fe80::5"),
        ];
        let plan = Reconciliation::plan(&adopted, &selected);
        assert_eq!(plan.adopt, vec![local("eth2", 5, "fe80::5")]);
        assert_eq!(plan.restart, vec![local("eth1", 3, "fe80::33")]);
        assert_eq!(plan.remove, vec!["wlan0".to_string()]);
    }

    #[test]
    fn plan_is_empty_when_nothing_changed() {
        let adopted = [local("eth0", 2, "fe80::2")];
        assert!(Reconciliation::plan(&adopted, &adopted).is_empty());
        let none: [LocalInterface; 0] = [];
        assert!(Reconciliation::plan(&none, &none).is_empty());
    }

    #[test]
    fn index_change_restarts() {
        let adopted = [local("eth0", 2, "fe80::2")];
        let plan = Reconciliation::plan(&adopted, &[local("eth0", 9, "fe80::2")]);
        assert_eq!(plan.restart.len(), 1);
    }

    #[test]
    fn oversized_frame_is_refused() {
        let iface = auto(Arc::new(LoopbackOnly));
        let frame = vec![0u8; HW_MTU + 1];
        assert!(matches!(
            iface.send(&frame),
            Err(SendError::TooLarge { size, mtu: HW_MTU }) if size == HW_MTU + 1
        ));
    }

    #[test]
    fn send_without_adopted_interfaces_is_offline() {
        let iface = auto(Arc::new(LoopbackOnly));
        assert!(!iface.is_online());
        assert!(matches!(iface.send(b"hello"), Err(SendError::Offline(_))));
        assert_eq!(iface.name(), "AutoInterface[auto0]");
        assert_eq!(iface.id(), InterfaceId(4));
    }

    #[test]
    fn inbound_channel_is_taken_once() {
        let iface = auto(Arc::new(LoopbackOnly));
        assert!(iface.take_inbound().is_some());
        assert!(iface.take_inbound().is_none());
    }

    #[tokio::test]
    async fn enumeration_failure_fails_start() {
        let iface = auto(Arc::new(Broken));
        assert!(matches!(
            iface.start().await,
            Err(InterfaceError::Enumeration(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_fails_start() {
        let mut config = AutoConfig::new("auto0");
        config.group_id.clear();
        let iface = AutoInterface::with_source(config, InterfaceId(1), Arc::new(LoopbackOnly));
        assert!(matches!(
            iface.start().await,
            Err(InterfaceError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn peer_job_prunes_silent_peers() {
        let iface = auto(Arc::new(LoopbackOnly));
        iface.start().await.unwrap();
        assert!(iface.adopted_interfaces().is_empty());

        let start = Instant::now();
        iface
            .peers()
            .upsert("fe80::2".parse().unwrap(), "eth0", 2, start);
        assert_eq!(iface.peers().len(), 1);

        // First peer job at 24.2s: the peer is past the 22s timeout.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(iface.peers().is_empty());

        iface.shutdown().await;
        assert!(iface.send(b"x").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_shutdown_is_refused() {
        let iface = auto(Arc::new(LoopbackOnly));
        iface.start().await.unwrap();
        iface.shutdown().await;
        assert!(matches!(iface.start().await, Err(InterfaceError::Stopped)));
        assert!(matches!(iface.send(b"x"), Err(SendError::Stopped(_))));
    }

    /// A host whose interface list the test rewrites between peer jobs.
    struct Scripted(Mutex<Vec<NetInterface>>);

    impl Scripted {
        fn new(ifaces: Vec<NetInterface>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(ifaces)))
        }

        fn set(&self, ifaces: Vec<NetInterface>) {
            *self.0.lock().unwrap() = ifaces;
        }
    }

    impl InterfaceSource for Scripted {
        fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn net(name: &str, index: u32, addr: &str) -> NetInterface {
        NetInterface {
            name: name.into(),
            index,
            loopback: false,
            link_local: Some(addr.parse().unwrap()),
        }
    }

    /// Record `local` as adopted without opening sockets.
    fn adopt_idle(iface: &AutoInterface, local: LocalInterface) -> Arc<ShutdownToken> {
        let tasks = Arc::new(ShutdownToken::new());
        tasks.set_online();
        let (outbound, _) = mpsc::channel(OUTBOUND_QUEUE);
        iface.adopted.write().unwrap().insert(
            local.name.clone(),
            Adopted {
                local,
                tasks: Arc::clone(&tasks),
                outbound,
                adopted_at: Instant::now(),
                echo_lost: AtomicBool::new(false),
            },
        );
        tasks
    }

    #[tokio::test(start_paused = true)]
    async fn carrier_drops_when_last_peer_times_out() {
        let source = Scripted::new(vec![net("eth0", 2, "fe80::2")]);
        let iface = auto(source);
        let eth0 = local("eth0", 2, "fe80::2");
        let tasks = adopt_idle(&iface, eth0.clone());
        let start = Instant::now();
        iface
            .peers()
            .upsert("fe80::9".parse().unwrap(), "eth0", 2, start);

        iface.run_peer_job(start + Duration::from_secs(10)).await;
        assert!(iface.carrier("eth0"));
        assert!(iface.is_online());

        iface.run_peer_job(start + Duration::from_secs(23)).await;
        assert!(iface.peers().is_empty());
        assert!(!iface.carrier("eth0"));
        assert!(!iface.is_online());
        // Offline, not released: discovery keeps running on eth0.
        assert!(!tasks.is_stopped());
        assert_eq!(iface.adopted_interfaces(), vec![eth0]);
    }

    #[tokio::test(start_paused = true)]
    async fn address_change_stops_old_tasks_and_keeps_peers() {
        let source = Scripted::new(vec![net("eth0", 2, "fe80::2")]);
        let iface = auto(source.clone());
        let old_tasks = adopt_idle(&iface, local("eth0", 2, "fe80::2"));
        let now = Instant::now();
        iface
            .peers()
            .upsert("fe80::9".parse().unwrap(), "eth0", 2, now);

        source.set(vec![net("eth0", 2, "fe80::22")]);
        iface.run_peer_job(now).await;

        assert!(old_tasks.is_stopped());
        assert_eq!(iface.peers().len(), 1);
        assert!(
            iface
                .adopted_interfaces()
                .iter()
                .all(|l| l.addr != "fe80::2".parse::<std::net::Ipv6Addr>().unwrap())
        );
        iface.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_interface_is_released_with_its_peers() {
        let source = Scripted::new(vec![net("eth0", 2, "fe80::2")]);
        let iface = auto(source.clone());
        let tasks = adopt_idle(&iface, local("eth0", 2, "fe80::2"));
        let now = Instant::now();
        iface
            .peers()
            .upsert("fe80::9".parse().unwrap(), "eth0", 2, now);

        source.set(vec![]);
        iface.run_peer_job(now).await;

        assert!(tasks.is_stopped());
        assert!(iface.adopted_interfaces().is_empty());
        assert!(iface.peers().is_empty());
        assert!(!iface.carrier("eth0"));
    }
}
