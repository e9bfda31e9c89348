use std::{fmt, io};

use metrics::{counter, Counter};

use crate::{metric::PacketType, registry::Server, writer::PacketKind};

/// Stage of a send at which a server failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// The socket to the server could not be opened.
    Connect,

    /// A packet could not be written to the server.
    Write(PacketKind),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect => f.write_str("connect"),
            FailureKind::Write(packet) => write!(f, "write {} packet", packet),
        }
    }
}

/// A non-fatal failure against a single server.
#[derive(Debug)]
pub struct SendFailure {
    server: Server,
    kind: FailureKind,
    error: io::Error,
}

impl SendFailure {
    /// Gets the server that failed.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Gets the stage at which the server failed.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Gets the underlying I/O error.
    pub fn error(&self) -> &io::Error {
        &self.error
    }
}

/// Outcome of sending a metric to every configured server.
///
/// Failures against individual servers never abort the send; they are collected here instead.
#[derive(Debug, Default)]
pub struct SendReport {
    servers_attempted: usize,
    servers_connected: usize,
    packets_sent: u64,
    bytes_sent: u64,
    packets_dropped: u64,
    bytes_dropped: u64,
    failures: Vec<SendFailure>,
}

impl SendReport {
    pub(crate) fn track_connect_succeeded(&mut self) {
        self.servers_attempted += 1;
        self.servers_connected += 1;
    }

    pub(crate) fn track_connect_failed(&mut self, server: Server, error: io::Error) {
        self.servers_attempted += 1;
        self.failures.push(SendFailure { server, kind: FailureKind::Connect, error });
    }

    pub(crate) fn track_packet_send_succeeded(&mut self, bytes_len: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes_len as u64;
    }

    pub(crate) fn track_packet_send_failed(
        &mut self,
        server: Server,
        packet: PacketKind,
        bytes_len: usize,
        error: io::Error,
    ) {
        self.packets_dropped += 1;
        self.bytes_dropped += bytes_len as u64;
        self.failures.push(SendFailure { server, kind: FailureKind::Write(packet), error });
    }

    /// Gets the number of servers a connection was attempted to.
    pub fn servers_attempted(&self) -> usize {
        self.servers_attempted
    }

    /// Gets the number of servers a connection was opened to.
    pub fn servers_connected(&self) -> usize {
        self.servers_connected
    }

    /// Gets the number of packets written.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Gets the number of bytes written.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Gets the number of packets that failed to be written.
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    /// Gets every failure, in the order they occurred.
    pub fn failures(&self) -> &[SendFailure] {
        &self.failures
    }

    /// Gets the failures to open a connection.
    pub fn connection_failures(&self) -> impl Iterator<Item = &SendFailure> {
        self.failures.iter().filter(|f| f.kind == FailureKind::Connect)
    }

    /// Gets the failures to write a packet.
    pub fn write_failures(&self) -> impl Iterator<Item = &SendFailure> {
        self.failures.iter().filter(|f| matches!(f.kind, FailureKind::Write(_)))
    }

    /// Returns `true` if every server was reached and every packet was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Gets the number of packets expected to be written for the given packet type.
    pub(crate) fn expected_packets(&self, packet_type: PacketType) -> u64 {
        let per_server =
            u64::from(packet_type.includes_metadata()) + u64::from(packet_type.includes_value());
        per_server * self.servers_connected as u64
    }
}

/// Exporter telemetry.
///
/// `Telemetry` tracks the behavior of the emitter itself, and can be optionally enabled to report it through the
/// installed `metrics` recorder.
pub struct Telemetry {
    packets_sent: Counter,
    packets_dropped: Counter,
    bytes_sent: Counter,
    bytes_dropped: Counter,
    connection_failures: Counter,
    encode_failures: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new() -> Self {
        let labels = telemetry_tags!();

        Self {
            packets_sent: counter!("ganglia.client.packets_sent", labels.iter()),
            packets_dropped: counter!("ganglia.client.packets_dropped", labels.iter()),
            bytes_sent: counter!("ganglia.client.bytes_sent", labels.iter()),
            bytes_dropped: counter!("ganglia.client.bytes_dropped", labels.iter()),
            connection_failures: counter!("ganglia.client.connection_failures", labels.iter()),
            encode_failures: counter!("ganglia.client.encode_failures", labels.iter()),
        }
    }

    /// Applies the outcome of a send.
    pub fn apply_report(&self, report: &SendReport) {
        self.packets_sent.increment(report.packets_sent);
        self.packets_dropped.increment(report.packets_dropped);
        self.bytes_sent.increment(report.bytes_sent);
        self.bytes_dropped.increment(report.bytes_dropped);
        self.connection_failures.increment(report.connection_failures().count() as u64);
    }

    /// Tracks a metric that could not be encoded.
    pub fn track_encode_failure(&self) {
        self.encode_failures.increment(1);
    }
}

macro_rules! _telemetry_tags {
    ($($k:literal => $v:expr),*) => {
        [
            ::metrics::Label::from_static_parts("client", "rust"),
            ::metrics::Label::from_static_parts("client_version", env!("CARGO_PKG_VERSION")),
            $(::metrics::Label::from_static_parts($k, $v),)*
        ]
    };
}

pub(crate) use _telemetry_tags as telemetry_tags;
