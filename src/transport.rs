//! UDP multicast transport boundary (spec §5, §6, §9).
//!
//! The sender re-opens a socket for every send, matching the process-wide
//! socket lifecycle the original implementation uses (one `UdpSock` per
//! transmit). The receiver opens one socket for the life of the process and
//! joins every subscribed multicast group, rather than only the last one —
//! the source's receive loop overwrote its `group.imr_multiaddr` on each
//! iteration and so only ever joined the final group in practice; this is
//! called out in spec §9 as a behavioural change to make deliberately.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::error::TransportError;

const GOOSE_SV_PORT: u16 = 102;
const MULTICAST_TTL: u32 = 16;

/// Sends one datagram per call, opening and closing a fresh socket each
/// time (spec §5: "send socket re-created per send in this profile").
pub struct MulticastSender {
    interface: Ipv4Addr,
}

impl MulticastSender {
    pub fn new(interface: Ipv4Addr) -> Self {
        Self { interface }
    }

    pub fn send(&self, group: Ipv4Addr, datagram: &[u8]) -> Result<(), TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|source| {
            TransportError::Bind {
                addr: "0.0.0.0:0".to_string(),
                source,
            }
        })?;
        socket
            .set_multicast_if_v4(&self.interface)
            .map_err(|source| TransportError::SetSockOpt {
                opt: "IP_MULTICAST_IF",
                source,
            })?;
        socket
            .set_multicast_ttl_v4(MULTICAST_TTL)
            .map_err(|source| TransportError::SetSockOpt {
                opt: "IP_MULTICAST_TTL",
                source,
            })?;

        let dest = SocketAddr::V4(SocketAddrV4::new(group, GOOSE_SV_PORT));
        socket
            .send_to(datagram, &dest.into())
            .map_err(|source| TransportError::Send {
                addr: dest.to_string(),
                source,
            })?;
        debug!(group = %group, bytes = datagram.len(), "sent datagram");
        Ok(())
    }
}

/// Owns one socket for the process lifetime, bound to `0.0.0.0:102` with
/// `SO_REUSEADDR`, joined to every group passed to [`MulticastReceiver::new`].
pub struct MulticastReceiver {
    socket: Socket,
}

impl MulticastReceiver {
    pub fn new(interface: Ipv4Addr, groups: &[Ipv4Addr]) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|source| {
            TransportError::Bind {
                addr: "0.0.0.0:102".to_string(),
                source,
            }
        })?;
        socket.set_reuse_address(true).map_err(|source| TransportError::SetSockOpt {
            opt: "SO_REUSEADDR",
            source,
        })?;
        socket.set_nonblocking(true).map_err(|source| TransportError::SetSockOpt {
            opt: "O_NONBLOCK",
            source,
        })?;

        let bind_addr: SocketAddr =
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, GOOSE_SV_PORT));
        socket.bind(&bind_addr.into()).map_err(|source| TransportError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;

        for group in groups {
            socket
                .join_multicast_v4(group, &interface)
                .map_err(|source| TransportError::JoinMulticast {
                    group: group.to_string(),
                    iface: interface.to_string(),
                    source,
                })?;
            debug!(group = %group, "joined multicast group");
        }

        Ok(Self { socket })
    }

    /// Wraps the socket2 socket as a `tokio::net::UdpSocket` for async recv.
    pub fn into_tokio(self) -> std::io::Result<tokio::net::UdpSocket> {
        let std_socket: std::net::UdpSocket = self.socket.into();
        tokio::net::UdpSocket::from_std(std_socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_construction_does_not_panic() {
        let _sender = MulticastSender::new(Ipv4Addr::LOCALHOST);
    }
}
