use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use crate::registry::Server;

pub(crate) mod sync;

/// Forwarder configuration.
#[derive(Clone, Debug, Default)]
pub struct ForwarderConfiguration {
    /// Timeout applied to each datagram write, if any.
    pub write_timeout: Option<Duration>,

    /// Whether or not to log the lifecycle of every connection.
    pub verbose: bool,
}

/// A connected datagram socket.
pub trait DatagramSocket {
    /// Sends a single datagram, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the datagram could not be written, an error is returned.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, buf)
    }
}

/// Opens sockets to servers.
///
/// Sockets are opened at the start of every send and dropped at the end of it, so dropping a socket must release it.
pub trait Connector {
    /// Socket type produced by this connector.
    type Socket: DatagramSocket;

    /// Opens a socket connected to `server`.
    ///
    /// # Errors
    ///
    /// If a socket could not be opened or connected, an error is returned.
    fn connect(&self, server: &Server, config: &ForwarderConfiguration) -> io::Result<Self::Socket>;
}

/// Connects to servers over UDP.
///
/// Each socket is bound to an ephemeral port on the unspecified address matching the server's address family.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpConnector;

impl Connector for UdpConnector {
    type Socket = UdpSocket;

    fn connect(&self, server: &Server, config: &ForwarderConfiguration) -> io::Result<UdpSocket> {
        let local_addr = match server.address() {
            IpAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            IpAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };

        UdpSocket::bind(local_addr).and_then(|socket| {
            socket.connect(server.socket_addr())?;
            socket.set_write_timeout(config.write_timeout)?;
            Ok(socket)
        })
    }
}
