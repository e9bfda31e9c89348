use tracing::{debug, error, trace};

use crate::{
    metric::PacketType,
    registry::{Server, ServerRegistry},
    telemetry::SendReport,
    writer::PacketKind,
};

use super::{Connector, DatagramSocket as _, ForwarderConfiguration};

/// An open socket to a single server.
///
/// The socket is released when the connection is dropped.
pub(crate) struct Connection<S> {
    server: Server,
    socket: S,
}

impl<S> Connection<S> {
    pub fn server(&self) -> &Server {
        &self.server
    }
}

/// Fans packets out to every server in a registry, one server at a time.
///
/// Connections only live for the duration of a single send. A server that cannot be reached is logged and skipped,
/// and never prevents the remaining servers from being sent to. Nothing is retried.
pub(crate) struct Forwarder<'a, C> {
    connector: &'a C,
    config: &'a ForwarderConfiguration,
}

impl<'a, C> Forwarder<'a, C>
where
    C: Connector,
{
    /// Create a new synchronous `Forwarder`.
    pub fn new(connector: &'a C, config: &'a ForwarderConfiguration) -> Self {
        Forwarder { connector, config }
    }

    /// Opens a connection to every server in `registry`, in order.
    ///
    /// Servers which cannot be connected to are tracked in `report` and left out of the returned connections.
    pub fn open_connections(
        &self,
        registry: &ServerRegistry,
        report: &mut SendReport,
    ) -> Vec<Connection<C::Socket>> {
        let mut connections = Vec::with_capacity(registry.len());

        for server in registry {
            match self.connector.connect(server, self.config) {
                Ok(socket) => {
                    if self.config.verbose {
                        trace!(%server, "Opened connection to server.");
                    }
                    report.track_connect_succeeded();
                    connections.push(Connection { server: *server, socket });
                }
                Err(e) => {
                    error!(%server, error = %e, "Failed to open connection to server. Skipping.");
                    report.track_connect_failed(*server, e);
                }
            }
        }

        connections
    }

    /// Writes the selected packets to every connection.
    ///
    /// The metadata packet is always written before the value packet. A failed write is tracked in `report` and does
    /// not stop any other write from being attempted.
    pub fn send(
        &self,
        connections: &mut [Connection<C::Socket>],
        metadata: &[u8],
        value: &[u8],
        packet_type: PacketType,
        report: &mut SendReport,
    ) {
        let packets = [
            (PacketKind::Metadata, metadata, packet_type.includes_metadata()),
            (PacketKind::Value, value, packet_type.includes_value()),
        ];

        for connection in connections.iter_mut() {
            for (packet, payload, enabled) in packets {
                if !enabled {
                    continue;
                }

                match connection.socket.send(payload) {
                    Ok(written) if written == payload.len() => {
                        report.track_packet_send_succeeded(payload.len());
                    }
                    Ok(written) => {
                        let e = std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            format!("wrote {} of {} bytes", written, payload.len()),
                        );
                        error!(server = %connection.server, %packet, error = %e, "Short write of packet.");
                        report.track_packet_send_failed(connection.server, packet, payload.len(), e);
                    }
                    Err(e) => {
                        error!(server = %connection.server, %packet, error = %e, "Failed to send packet.");
                        report.track_packet_send_failed(connection.server, packet, payload.len(), e);
                    }
                }
            }
        }

        debug!(
            packets_sent = report.packets_sent(),
            packets_dropped = report.packets_dropped(),
            packets_expected = report.expected_packets(packet_type),
            "Finished sending packets."
        );
    }

    /// Closes every connection.
    pub fn close_connections(&self, connections: Vec<Connection<C::Socket>>) {
        for connection in connections {
            if self.config.verbose {
                trace!(server = %connection.server(), "Closing connection to server.");
            }
            drop(connection);
        }
    }
}
