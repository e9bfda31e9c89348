//! A client for sending metrics to [Ganglia][ganglia] `gmond` daemons.
//!
//! [ganglia]: http://ganglia.info/
//!
//! # Usage
//!
//! Using the emitter is straightforward:
//!
//! ```no_run
//! # use metrics_exporter_ganglia::{GangliaBuilder, MetricDescriptor, SenderIdentity, Slope};
//! // First, create a builder and point it at one or more `gmond` daemons.
//! //
//! // The builder can also configure the maximum packet length, a write timeout, the logger used while sending, and
//! // whether or not the emitter reports its own telemetry.
//! let emitter = GangliaBuilder::default()
//!     .with_server_address("127.0.0.1:8649")
//!     .expect("failed to parse server address")
//!     .build()
//!     .expect("failed to build emitter");
//!
//! // Metrics are reported under a sender identity. A proxy reporting on behalf of another machine can spoof that
//! // machine's identity instead.
//! let identity = SenderIdentity::new("10.0.0.5");
//!
//! let descriptor = MetricDescriptor::double("cpu_load", 0.42)
//!     .with_units("load")
//!     .with_slope(Slope::Both)
//!     .with_tmax(300)
//!     .with_dmax(600);
//!
//! // Sends the metadata and value packets to every server. Servers which cannot be reached are logged and skipped.
//! let report = emitter.send_metric(&identity, &descriptor).expect("metric too large to encode");
//! assert!(report.servers_attempted() <= 1);
//! ```
//!
//! # Protocol
//!
//! Every metric is sent as two UDP datagrams, both encoded with XDR: a metadata packet (`gmetadata_full`) that
//! declares the metric's type, units, slope, and lifetimes, and a value packet that carries the value as a string.
//! `gmond` only accepts value packets for metrics it has seen metadata for, and re-parses each value according to the
//! type declared in the metadata.
//!
//! Packets are limited to 512 bytes by default. A metric that does not fit is rejected with an error instead of being
//! truncated, since `gmond` cannot detect a truncated packet.
//!
//! # Delivery
//!
//! Delivery is best effort. Connections are opened for every send and closed before it returns, nothing is retried,
//! and a server that cannot be reached or written to never prevents the remaining servers from being sent to. Each
//! send returns a [`SendReport`] describing what happened.
//!
//! # Telemetry
//!
//! The emitter can optionally report its own telemetry, such as the number of packets and bytes sent and the number of
//! connection failures, through the installed [`metrics`] recorder. All internal telemetry is under the
//! `ganglia.client` namespace.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, GangliaBuilder};

mod emitter;
pub use self::emitter::GangliaEmitter;

mod forwarder;
pub use self::forwarder::{Connector, DatagramSocket, ForwarderConfiguration, UdpConnector};

mod metric;
pub use self::metric::{MetricDescriptor, Origin, PacketType, SenderIdentity, Slope, ValueType};

mod registry;
pub use self::registry::{Server, ServerRegistry};

mod telemetry;
pub use self::telemetry::{FailureKind, SendFailure, SendReport};

mod writer;
pub use self::writer::{
    EncodeError, PacketKind, PacketWriter, DEFAULT_MAX_PACKET_LEN, SMALLEST_VALID_PACKET_LEN,
};

pub mod xdr;
