//! Group socket setup and teardown.

use std::net::SocketAddrV4;

use mio::net::UdpSocket;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::bind::BindStrategy;
use super::config::{ChannelConfig, GroupAddress};
use crate::Result;

/// Open a non-blocking UDP socket joined to `group`.
///
/// Options that must precede `bind` (receive buffer, address reuse) are set
/// through `socket2`; the finished socket is handed to `mio` for readiness.
pub(crate) fn open_group_socket(
    group: &GroupAddress,
    config: &ChannelConfig,
    strategy: BindStrategy,
) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.set_reuse_address(true)?;

    let bind_addr: SocketAddrV4 = strategy.bind_addr(group);
    socket.bind(&SockAddr::from(bind_addr))?;

    socket.join_multicast_v4(&group.group(), &group.adapter())?;
    socket.set_multicast_if_v4(&group.adapter())?;
    socket.set_multicast_loop_v4(config.multicast_loop)?;
    if let Some(ttl) = config.multicast_ttl {
        socket.set_multicast_ttl_v4(ttl)?;
    }
    socket.set_nonblocking(true)?;

    tracing::debug!(
        target: cotcast_core::logging::targets::MULTICAST,
        %group,
        %bind_addr,
        ?strategy,
        "joined multicast group"
    );

    Ok(UdpSocket::from_std(socket.into()))
}

/// Drop membership of `group` on its adapter.
pub(crate) fn leave_group(socket: &UdpSocket, group: &GroupAddress) -> std::io::Result<()> {
    socket.leave_multicast_v4(&group.group(), &group.adapter())
}
