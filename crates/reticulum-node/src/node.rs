//! Core Node struct and async event loop.
//!
//! The Node builds the transport context, starts every enabled
//! AutoInterface, bridges their inbound frames into one event loop, and on
//! shutdown stops interfaces, the table sweep and every link.
//!
//! Inbound frames are told apart by their first 16 bytes:
//!
//! ```text
//! link_id(16) sig(64) x25519(32)     proof, for a link we initiated
//! link_id(16) token(..)              traffic on a registered link
//! dest(16) x25519(32) ed25519(32)    request for a local destination
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use reticulum_core::shutdown::stopped;
use reticulum_core::{ConnectionInterface, DestinationHash, InterfaceId, LinkId};
use reticulum_interfaces::auto::InboundFrame;
use reticulum_interfaces::{AutoConfig, AutoInterface, InterfaceError};
use reticulum_protocol::link::{
    LinkEstablishment, LinkRole, LocalDestination, PROOF_SIZE, RequestPacket,
};
use reticulum_protocol::{Link, LinkRegistry, LinkStatus};
use reticulum_transport::{Transport, TransportConfig};

use crate::config::NodeConfig;
use crate::error::NodeError;

/// Events delivered to the central event loop from interface receive bridges.
#[derive(Debug)]
enum NodeEvent {
    Inbound {
        interface: Arc<dyn ConnectionInterface>,
        frame: InboundFrame,
    },
}

/// Frames from an AutoInterface come straight from a neighbour.
const NEIGHBOUR_HOPS: u8 = 1;

/// What became of one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A link request for a local destination was answered and registered.
    LinkAccepted(Arc<Link>),
    /// A proof completed one of our outgoing links.
    LinkEstablished(Arc<Link>),
    /// Traffic on a registered link was decrypted.
    LinkData { link: Arc<Link>, plaintext: Vec<u8> },
    Dropped,
}

/// Requests shutdown of a running [`Node`] from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Counters kept by the event loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub links_accepted: u64,
    pub links_established: u64,
    pub link_frames: u64,
    pub frames_dropped: u64,
}

/// A Reticulum node that manages interfaces, transport, and the event loop.
pub struct Node {
    name: String,
    transport: Arc<Transport>,
    establishment: LinkEstablishment,
    destinations: HashMap<DestinationHash, LocalDestination>,
    auto_configs: Vec<AutoConfig>,
    interfaces: Vec<Arc<AutoInterface>>,
    event_tx: mpsc::Sender<NodeEvent>,
    event_rx: mpsc::Receiver<NodeEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    next_id: u64,
    bridge_handles: Vec<JoinHandle<()>>,
    stats: NodeStats,
}

impl Node {
    /// Create a new node from configuration. Nothing runs until [`start`](Self::start).
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let transport = Transport::new(config.transport.to_transport_config()?);
        Self::with_transport(config, transport)
    }

    /// Create a node around an existing transport.
    pub fn with_transport(config: NodeConfig, transport: Arc<Transport>) -> Result<Self, NodeError> {
        let mut auto_configs = Vec::new();
        for entry in config.interfaces.auto.iter().filter(|e| e.enabled) {
            auto_configs.push(entry.to_auto_config()?);
        }
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            name: config.node.name,
            establishment: transport.link_establishment(),
            transport,
            destinations: HashMap::new(),
            auto_configs,
            interfaces: Vec::new(),
            event_tx,
            event_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            next_id: 1,
            bridge_handles: Vec::new(),
            stats: NodeStats::default(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn transport_config(&self) -> &TransportConfig {
        self.transport.config()
    }

    /// Accept link requests addressed to `destination`.
    pub fn add_destination(&mut self, destination: LocalDestination) {
        tracing::info!(destination = %destination.hash(), "local destination added");
        self.destinations.insert(destination.hash(), destination);
    }

    pub fn destinations(&self) -> impl Iterator<Item = &LocalDestination> {
        self.destinations.values()
    }

    /// Interfaces that started successfully.
    pub fn interfaces(&self) -> &[Arc<AutoInterface>] {
        &self.interfaces
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Start the transport and every enabled interface.
    ///
    /// An interface that cannot start is disabled and logged; the node runs
    /// on without it.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.transport.is_running() {
            return Err(NodeError::AlreadyRunning);
        }
        self.transport.start().await;

        for config in self.auto_configs.clone() {
            let id = InterfaceId(self.next_id);
            self.next_id += 1;
            let name = config.name.clone();
            let iface = AutoInterface::new(config, id);
            match iface.start().await {
                Ok(()) => {
                    self.spawn_receive_bridge(&iface);
                    self.interfaces.push(iface);
                }
                Err(InterfaceError::UnsupportedPlatform(os)) => {
                    tracing::error!(interface = %name, os, "interface disabled");
                }
                Err(e) => {
                    tracing::error!(interface = %name, error = %e, "failed to start interface, disabled");
                }
            }
        }

        tracing::info!(
            node = %self.name,
            interfaces = self.interfaces.len(),
            "node started"
        );
        Ok(())
    }

    /// Forward an interface's inbound frames into the event loop.
    fn spawn_receive_bridge(&mut self, iface: &Arc<AutoInterface>) {
        let Some(mut inbound) = iface.take_inbound() else {
            return;
        };
        let interface: Arc<dyn ConnectionInterface> = iface.clone();
        let event_tx = self.event_tx.clone();
        let mut stop = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.recv() => {
                        let Some(frame) = frame else { break };
                        let event = NodeEvent::Inbound {
                            interface: Arc::clone(&interface),
                            frame,
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    _ = stopped(&mut stop) => break,
                }
            }
        });
        self.bridge_handles.push(handle);
    }

    /// Run the main event loop. Returns when shutdown is signalled.
    pub async fn run(&mut self) {
        let mut stop = self.shutdown_tx.subscribe();
        tracing::info!("entering event loop");

        loop {
            tokio::select! {
                biased;

                _ = stopped(&mut stop) => {
                    tracing::info!("shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => {
                    match event {
                        Some(NodeEvent::Inbound { interface, frame }) => {
                            self.handle_inbound(&interface, &frame);
                        }
                        None => {
                            tracing::info!("event channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn handle_inbound(&mut self, interface: &Arc<dyn ConnectionInterface>, frame: &InboundFrame) {
        tracing::trace!(
            interface = %interface.id(),
            ifname = %frame.ifname,
            source = %frame.source,
            len = frame.data.len(),
            "frame received"
        );
        self.handle_frame(interface, &frame.data);
    }

    /// Route one inbound frame to link establishment or to its link.
    pub fn handle_frame(
        &mut self,
        interface: &Arc<dyn ConnectionInterface>,
        data: &[u8],
    ) -> FrameOutcome {
        self.stats.frames_received += 1;
        self.stats.bytes_received += data.len() as u64;

        let outcome = self.dispatch(interface, data);
        match &outcome {
            FrameOutcome::LinkAccepted(_) => self.stats.links_accepted += 1,
            FrameOutcome::LinkEstablished(_) => self.stats.links_established += 1,
            FrameOutcome::LinkData { .. } => self.stats.link_frames += 1,
            FrameOutcome::Dropped => self.stats.frames_dropped += 1,
        }
        outcome
    }

    fn dispatch(&self, interface: &Arc<dyn ConnectionInterface>, data: &[u8]) -> FrameOutcome {
        let Some(prefix) = data.get(..LinkId::LEN) else {
            tracing::debug!(interface = %interface.id(), len = data.len(), "runt frame dropped");
            return FrameOutcome::Dropped;
        };

        if let Ok(link_id) = LinkId::try_from(prefix)
            && let Some(link) = self.transport.find_link(&link_id)
        {
            return self.link_frame(link, data);
        }

        if let Ok(dest) = DestinationHash::try_from(prefix)
            && let Some(destination) = self.destinations.get(&dest)
        {
            let packet = match RequestPacket::from_frame(data, NEIGHBOUR_HOPS, Arc::clone(interface)) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::error!(
                        destination = %dest,
                        interface = interface.name(),
                        error = %e,
                        "dropping invalid link request"
                    );
                    return FrameOutcome::Dropped;
                }
            };
            // Failures are logged by establishment.
            return match self.establishment.validate_request(destination, &packet) {
                Ok(link) => FrameOutcome::LinkAccepted(link),
                Err(_) => FrameOutcome::Dropped,
            };
        }

        tracing::debug!(interface = %interface.id(), len = data.len(), "frame for no known link or destination");
        FrameOutcome::Dropped
    }

    fn link_frame(&self, link: Arc<Link>, data: &[u8]) -> FrameOutcome {
        let awaiting_proof =
            link.role() == LinkRole::Initiator && link.status() == LinkStatus::Handshaking;
        if awaiting_proof && data.len() == PROOF_SIZE {
            return match self.establishment.receive_proof(data) {
                Ok(link) => {
                    tracing::info!(link_id = %link.id(), "outbound link established");
                    FrameOutcome::LinkEstablished(link)
                }
                Err(e) => {
                    tracing::debug!(link_id = %link.id(), error = %e, "proof dropped");
                    FrameOutcome::Dropped
                }
            };
        }

        match link.receive(&data[LinkId::LEN..], Instant::now()) {
            Ok(plaintext) => FrameOutcome::LinkData { link, plaintext },
            Err(e) => {
                tracing::debug!(link_id = %link.id(), error = %e, "link frame dropped");
                FrameOutcome::Dropped
            }
        }
    }

    /// Signal the node to shut down.
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Shut down all interfaces, the table sweep and every link.
    pub async fn shutdown(mut self) {
        tracing::info!("shutting down node");
        self.trigger_shutdown();

        for handle in self.bridge_handles.drain(..) {
            let _ = handle.await;
        }

        for iface in self.interfaces.drain(..) {
            iface.shutdown().await;
            self.transport.interface_removed(iface.id());
        }

        self.transport.shutdown().await;
        tracing::info!("node shutdown complete");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("interfaces", &self.interfaces.len())
            .field("destinations", &self.destinations.len())
            .field("stats", &self.stats)
            .finish()
    }
}
