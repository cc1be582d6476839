//! UDP sockets for one adopted interface.
//!
//! Every socket is created through `socket2` so reuse and multicast options
//! can be set before binding, then handed to tokio.

use std::io;
use std::net::{Ipv6Addr, SocketAddrV6};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;

use super::DiscoveryScope;
use super::netif::LocalInterface;

fn udp_v6(reuse: bool) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    if reuse {
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
    }
    socket.set_only_v6(true)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn into_tokio(socket: Socket) -> io::Result<UdpSocket> {
    UdpSocket::from_std(socket.into())
}

/// Listener for discovery announces on `local`.
///
/// Link scope binds to the group address qualified with the interface
/// index; wider scopes bind to the group address unqualified.
pub(crate) fn discovery_listener(
    group: Ipv6Addr,
    scope: DiscoveryScope,
    port: u16,
    local: &LocalInterface,
) -> io::Result<UdpSocket> {
    let socket = udp_v6(true)?;
    socket.join_multicast_v6(&group, local.index)?;
    let scope_id = match scope {
        DiscoveryScope::Link => local.index,
        _ => 0,
    };
    socket.bind(&SockAddr::from(SocketAddrV6::new(group, port, 0, scope_id)))?;
    into_tokio(socket)
}

/// Sender for our own announces on `local`.
///
/// Loopback stays enabled so the announce echoes back to the listener,
/// which is how the echo timeout detects a dead multicast path.
pub(crate) fn announcer(local: &LocalInterface) -> io::Result<UdpSocket> {
    let socket = udp_v6(false)?;
    socket.set_multicast_if_v6(local.index)?;
    socket.set_multicast_loop_v6(true)?;
    socket.bind(&SockAddr::from(SocketAddrV6::new(local.addr, 0, 0, local.index)))?;
    into_tokio(socket)
}

/// Unicast data socket on `local`, used for both directions.
pub(crate) fn data(local: &LocalInterface, port: u16) -> io::Result<UdpSocket> {
    let socket = udp_v6(true)?;
    socket.bind(&SockAddr::from(SocketAddrV6::new(
        local.addr, port, 0, local.index,
    )))?;
    into_tokio(socket)
}

/// Where a peer's data port is reached through `local`.
pub(crate) fn peer_endpoint(peer: Ipv6Addr, port: u16, local: &LocalInterface) -> SocketAddrV6 {
    SocketAddrV6::new(peer, port, 0, local.index)
}
