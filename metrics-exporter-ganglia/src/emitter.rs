use std::sync::OnceLock;

use tracing::{debug, dispatcher, error, Dispatch};

use crate::{
    forwarder::{sync::Forwarder, Connector, ForwarderConfiguration, UdpConnector},
    metric::{MetricDescriptor, PacketType, SenderIdentity},
    registry::{Server, ServerRegistry},
    telemetry::{SendReport, Telemetry},
    writer::{EncodeError, PacketWriter},
};

/// Sends metrics to every configured `gmond` server.
///
/// Each send encodes the metric once, opens a connection to every server, writes the packets, and closes every
/// connection again before returning. Connections are never reused across sends.
///
/// Sends only need a shared reference, so an emitter can be shared between threads once built. Adding servers needs an
/// exclusive reference, which keeps the server list from changing in the middle of a send.
pub struct GangliaEmitter<C = UdpConnector> {
    registry: ServerRegistry,
    connector: C,
    writer: PacketWriter,
    forwarder_config: ForwarderConfiguration,
    logger: Option<Dispatch>,
    telemetry: Option<OnceLock<Telemetry>>,
}

impl<C> GangliaEmitter<C>
where
    C: Connector,
{
    pub(crate) fn new(
        registry: ServerRegistry,
        connector: C,
        writer: PacketWriter,
        forwarder_config: ForwarderConfiguration,
        logger: Option<Dispatch>,
        telemetry: bool,
    ) -> Self {
        GangliaEmitter {
            registry,
            connector,
            writer,
            forwarder_config,
            logger,
            telemetry: telemetry.then(OnceLock::new),
        }
    }

    /// Adds a server to send metrics to.
    pub fn add_server(&mut self, server: Server) {
        self.registry.add(server);
    }

    /// Gets the servers metrics are sent to.
    pub fn servers(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Gets the maximum packet length.
    pub fn max_packet_len(&self) -> usize {
        self.writer.max_packet_len()
    }

    /// Sends both the metadata and value packets for a metric to every server.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, an error is returned and nothing is sent. Failures to reach individual servers
    /// are not errors: they are logged and collected in the returned [`SendReport`].
    pub fn send_metric(
        &self,
        identity: &SenderIdentity,
        descriptor: &MetricDescriptor,
    ) -> Result<SendReport, EncodeError> {
        self.send_packets(identity, descriptor, PacketType::Both)
    }

    /// Sends the selected packets for a metric to every server.
    ///
    /// `gmond` ignores value packets for metrics it has not yet received a metadata packet for, so sending only value
    /// packets is only useful once the metadata has been sent at least once.
    ///
    /// # Errors
    ///
    /// If the metric cannot be encoded, an error is returned and nothing is sent. Failures to reach individual servers
    /// are not errors: they are logged and collected in the returned [`SendReport`].
    pub fn send_packets(
        &self,
        identity: &SenderIdentity,
        descriptor: &MetricDescriptor,
        packet_type: PacketType,
    ) -> Result<SendReport, EncodeError> {
        match &self.logger {
            Some(logger) => dispatcher::with_default(logger, || {
                self.send_packets_inner(identity, descriptor, packet_type)
            }),
            None => self.send_packets_inner(identity, descriptor, packet_type),
        }
    }

    fn send_packets_inner(
        &self,
        identity: &SenderIdentity,
        descriptor: &MetricDescriptor,
        packet_type: PacketType,
    ) -> Result<SendReport, EncodeError> {
        debug!(name = descriptor.name(), value = descriptor.value(), ?packet_type, "Sending metric.");

        // Both packets are encoded up front so that a metric which cannot be encoded never opens a connection.
        let origin = identity.origin();
        let encoded = self
            .writer
            .metadata_packet(origin, descriptor)
            .and_then(|metadata| Ok((metadata, self.writer.value_packet(origin, descriptor)?)));
        let (metadata, value) = match encoded {
            Ok(packets) => packets,
            Err(e) => {
                error!(name = descriptor.name(), error = %e, "Failed to encode metric.");
                if let Some(telemetry) = self.telemetry() {
                    telemetry.track_encode_failure();
                }
                return Err(e);
            }
        };

        let forwarder = Forwarder::new(&self.connector, &self.forwarder_config);
        let mut report = SendReport::default();

        let mut connections = forwarder.open_connections(&self.registry, &mut report);
        forwarder.send(&mut connections, &metadata, &value, packet_type, &mut report);
        forwarder.close_connections(connections);

        if let Some(telemetry) = self.telemetry() {
            telemetry.apply_report(&report);
        }

        Ok(report)
    }

    fn telemetry(&self) -> Option<&Telemetry> {
        // Counters are registered on first use, so that they are registered with whichever recorder is installed by
        // the time metrics are actually being sent.
        self.telemetry.as_ref().map(|telemetry| telemetry.get_or_init(Telemetry::new))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        net::{IpAddr, Ipv4Addr},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use tracing::Dispatch;

    use crate::{
        builder::GangliaBuilder,
        forwarder::{Connector, DatagramSocket, ForwarderConfiguration},
        metric::{MetricDescriptor, PacketType, SenderIdentity, Slope, ValueType},
        registry::Server,
        writer::EncodeError,
    };

    #[derive(Clone, Default)]
    struct Sockets {
        open: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
        sent: Arc<Mutex<Vec<(u16, Vec<u8>)>>>,
    }

    struct TestSocket {
        port: u16,
        sockets: Sockets,
    }

    impl DatagramSocket for TestSocket {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sockets.sent.lock().unwrap().push((self.port, buf.to_vec()));
            Ok(buf.len())
        }
    }

    impl Drop for TestSocket {
        fn drop(&mut self) {
            self.sockets.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Refuses to connect to port 0.
    struct TestConnector(Sockets);

    impl Connector for TestConnector {
        type Socket = TestSocket;

        fn connect(&self, server: &Server, _: &ForwarderConfiguration) -> io::Result<TestSocket> {
            if server.port() == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable"));
            }

            self.0.open.fetch_add(1, Ordering::SeqCst);
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(TestSocket { port: server.port(), sockets: self.0.clone() })
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn server(port: u16) -> Server {
        Server::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn cpu_load() -> MetricDescriptor {
        MetricDescriptor::new("cpu_load", "0.42", ValueType::Double)
            .with_units("load")
            .with_slope(Slope::Both)
            .with_tmax(300)
            .with_dmax(600)
    }

    fn capture_logger(buf: &SharedBuf) -> Dispatch {
        let buf = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || buf.clone())
            .finish();
        Dispatch::new(subscriber)
    }

    #[test]
    fn partial_failure_still_sends_to_reachable_servers() {
        let sockets = Sockets::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .with_server(server(0))
            .with_server(server(8651))
            .build_with_connector(TestConnector(sockets.clone()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        let report = emitter.send_metric(&identity, &cpu_load()).unwrap();

        assert_eq!(report.servers_attempted(), 3);
        assert_eq!(report.servers_connected(), 2);
        assert_eq!(report.connection_failures().count(), 1);
        assert_eq!(report.failures()[0].server(), &server(0));
        assert_eq!(report.packets_sent(), 4);

        let sent = sockets.sent.lock().unwrap();
        let ports = sent.iter().map(|(port, _)| *port).collect::<Vec<_>>();
        assert_eq!(ports, vec![8649, 8649, 8651, 8651]);
        assert_eq!(&sent[0].1[..4], &[0, 0, 0, 128]);
        assert_eq!(&sent[1].1[..4], &[0, 0, 0, 133]);

        assert_eq!(sockets.opened.load(Ordering::SeqCst), 2);
        assert_eq!(sockets.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sockets_are_not_reused_across_sends() {
        let sockets = Sockets::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .build_with_connector(TestConnector(sockets.clone()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        for _ in 0..3 {
            emitter.send_metric(&identity, &cpu_load()).unwrap();
            assert_eq!(sockets.open.load(Ordering::SeqCst), 0);
        }

        assert_eq!(sockets.opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn packets_are_identical_across_servers() {
        let sockets = Sockets::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(1))
            .with_server(server(2))
            .build_with_connector(TestConnector(sockets.clone()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5").with_spoof("10.0.0.9:proxyhost");
        emitter.send_metric(&identity, &cpu_load().with_group("cpu")).unwrap();

        let sent = sockets.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].1, sent[2].1);
        assert_eq!(sent[1].1, sent[3].1);
    }

    #[test]
    fn encode_failure_opens_no_connections() {
        let sockets = Sockets::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .build_with_connector(TestConnector(sockets.clone()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        let descriptor = MetricDescriptor::string("motd", "x".repeat(1024));

        let result = emitter.send_metric(&identity, &descriptor);
        assert!(matches!(result, Err(EncodeError::PacketTooLarge { .. })));
        assert_eq!(sockets.opened.load(Ordering::SeqCst), 0);
        assert!(sockets.sent.lock().unwrap().is_empty());

        let result = emitter.send_metric(&identity, &MetricDescriptor::string("", "x"));
        assert_eq!(result.unwrap_err(), EncodeError::EmptyMetricName);
    }

    #[test]
    fn send_only_value_packets() {
        let sockets = Sockets::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .build_with_connector(TestConnector(sockets.clone()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        let report = emitter.send_packets(&identity, &cpu_load(), PacketType::Value).unwrap();

        assert_eq!(report.packets_sent(), 1);
        let sent = sockets.sent.lock().unwrap();
        assert_eq!(&sent[0].1[..4], &[0, 0, 0, 133]);
    }

    #[test]
    fn add_server_after_build() {
        let sockets = Sockets::default();
        let mut emitter =
            GangliaBuilder::new().build_with_connector(TestConnector(sockets.clone())).unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        let report = emitter.send_metric(&identity, &cpu_load()).unwrap();
        assert_eq!(report.servers_attempted(), 0);

        emitter.add_server(server(8649));
        let report = emitter.send_metric(&identity, &cpu_load()).unwrap();
        assert_eq!(report.servers_attempted(), 1);
        assert_eq!(report.packets_sent(), 2);
    }

    #[test]
    fn logs_go_to_injected_logger() {
        let buf = SharedBuf::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .with_server(server(0))
            .with_logger(capture_logger(&buf))
            .build_with_connector(TestConnector(Sockets::default()))
            .unwrap();

        let identity = SenderIdentity::new("10.0.0.5");
        emitter.send_metric(&identity, &cpu_load()).unwrap();

        let logs = buf.contents();
        assert_eq!(logs.matches("Failed to open connection to server").count(), 1);
        assert!(logs.contains("127.0.0.1:0"));
        assert!(logs.contains("Sending metric"));
        assert!(!logs.contains("Encoded packet"));
    }

    #[test]
    fn verbose_logging_dumps_packets() {
        let buf = SharedBuf::default();
        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .with_logger(capture_logger(&buf))
            .with_verbose(true)
            .build_with_connector(TestConnector(Sockets::default()))
            .unwrap();

        let identity = SenderIdentity::new("h");
        emitter.send_metric(&identity, &MetricDescriptor::uint32("m", 1)).unwrap();

        let logs = buf.contents();
        assert_eq!(logs.matches("Encoded packet").count(), 2);
        assert!(logs.contains("00000080"));
        assert!(logs.contains("00000085"));
        assert!(logs.contains("Closing connection to server"));
    }

    #[test]
    fn telemetry_tracks_sends() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let emitter = GangliaBuilder::new()
            .with_server(server(8649))
            .with_server(server(0))
            .with_telemetry(true)
            .build_with_connector(TestConnector(Sockets::default()))
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            let identity = SenderIdentity::new("10.0.0.5");
            emitter.send_metric(&identity, &cpu_load()).unwrap();
            emitter.send_metric(&identity, &cpu_load()).unwrap();
            let _ = emitter.send_metric(&identity, &MetricDescriptor::string("", "x"));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = |name: &str| {
            snapshot.iter().find_map(|(key, _, _, value)| match value {
                DebugValue::Counter(value) if key.key().name() == name => Some(*value),
                _ => None,
            })
        };

        assert_eq!(counter("ganglia.client.packets_sent"), Some(4));
        assert_eq!(counter("ganglia.client.connection_failures"), Some(2));
        assert_eq!(counter("ganglia.client.encode_failures"), Some(1));
    }
}
