use std::time::Duration;

use thiserror::Error;
use tracing::Dispatch;

use crate::{
    emitter::GangliaEmitter,
    forwarder::{Connector, ForwarderConfiguration, UdpConnector},
    registry::{Server, ServerRegistry},
    writer::{PacketWriter, DEFAULT_MAX_PACKET_LEN, SMALLEST_VALID_PACKET_LEN},
};

/// Errors that could occur while building a Ganglia emitter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse or resolve a server address.
    #[error("invalid server address: {reason}")]
    InvalidServerAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The maximum packet length is too small to hold any metric.
    #[error("maximum packet length of {len} bytes is too small (must be {min} or greater)")]
    InvalidPacketLength {
        /// Configured maximum packet length.
        len: usize,

        /// Smallest allowed maximum packet length.
        min: usize,
    },
}

/// Builder for a Ganglia emitter.
pub struct GangliaBuilder {
    registry: ServerRegistry,
    max_packet_len: usize,
    write_timeout: Option<Duration>,
    logger: Option<Dispatch>,
    verbose: bool,
    telemetry: bool,
}

impl GangliaBuilder {
    /// Creates a new `GangliaBuilder` with no servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server to send metrics to.
    ///
    /// Servers are sent to in the order they are added. Adding the same server more than once sends every metric to it
    /// more than once.
    #[must_use]
    pub fn with_server(mut self, server: Server) -> Self {
        self.registry.add(server);
        self
    }

    /// Adds a server to send metrics to, by address.
    ///
    /// The address must be in the format of `<host>:<port>`. If the host resolves to multiple addresses, only the first
    /// is used. `gmond` listens on port 8649 by default.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed or resolved, an error will be returned indicating the reason.
    pub fn with_server_address<A>(self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let server = Server::resolve(addr.as_ref())
            .map_err(|reason| BuildError::InvalidServerAddress { reason })?;
        Ok(self.with_server(server))
    }

    /// Set the maximum packet length.
    ///
    /// A metric whose metadata or value packet would be larger than this is rejected with an error, rather than
    /// truncated.
    ///
    /// Defaults to 512 bytes, the limit used by the reference Ganglia client.
    #[must_use]
    pub fn with_maximum_packet_length(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Set the write timeout for sending packets.
    ///
    /// When the write timeout is reached, the packet being sent at the time is dropped without retrying, and the send
    /// moves on to the next server. A zero duration is the same as no timeout.
    ///
    /// Defaults to no timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    /// Sets the logger used by the emitter.
    ///
    /// All events emitted while sending a metric are dispatched to `logger` instead of the current default subscriber.
    ///
    /// Defaults to the current default subscriber at the time of each send.
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sets whether or not to log verbosely.
    ///
    /// When enabled, the emitter additionally logs every connection being opened and closed, along with a hex dump of
    /// every packet it encodes, at the trace level.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets whether or not to enable telemetry for the emitter.
    ///
    /// When enabled, counters describing the packets and bytes sent, the packets dropped, and the connection and
    /// encoding failures are registered with the installed `metrics` recorder, under the `ganglia.client` namespace.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: bool) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builds an emitter that sends metrics over UDP.
    ///
    /// # Errors
    ///
    /// If the maximum packet length is too small to hold any metric, an error will be returned.
    pub fn build(self) -> Result<GangliaEmitter, BuildError> {
        self.build_with_connector(UdpConnector)
    }

    /// Builds an emitter that opens its sockets with the given connector.
    ///
    /// # Errors
    ///
    /// If the maximum packet length is too small to hold any metric, an error will be returned.
    pub fn build_with_connector<C>(self, connector: C) -> Result<GangliaEmitter<C>, BuildError>
    where
        C: Connector,
    {
        if self.max_packet_len < SMALLEST_VALID_PACKET_LEN {
            return Err(BuildError::InvalidPacketLength {
                len: self.max_packet_len,
                min: SMALLEST_VALID_PACKET_LEN,
            });
        }

        let writer = PacketWriter::new(self.max_packet_len).with_verbose(self.verbose);
        let forwarder_config =
            ForwarderConfiguration { write_timeout: self.write_timeout, verbose: self.verbose };

        Ok(GangliaEmitter::new(
            self.registry,
            connector,
            writer,
            forwarder_config,
            self.logger,
            self.telemetry,
        ))
    }
}

impl Default for GangliaBuilder {
    fn default() -> Self {
        GangliaBuilder {
            registry: ServerRegistry::new(),
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            write_timeout: None,
            logger: None,
            verbose: false,
            telemetry: false,
        }
    }
}
