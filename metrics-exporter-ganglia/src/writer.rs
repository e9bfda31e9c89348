use std::fmt;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::trace;

use crate::{
    metric::{MetricDescriptor, Origin},
    xdr::{append_integer, append_string, encoded_string_len},
};

/// Packet tag for `gmetadata_full`.
const METADATA_PACKET_ID: u32 = 128;

/// Packet tag for a string-formatted value (`gmetric_string`).
const VALUE_PACKET_ID: u32 = METADATA_PACKET_ID + 5;

/// Value packets always declare string formatting; `gmond` re-parses the value using the type from the metadata.
const VALUE_FORMAT: &str = "%s";

const GROUP_KEY: &str = "GROUP";
const SPOOF_HOST_KEY: &str = "SPOOF_HOST";

/// Legacy upper bound on a Ganglia datagram.
pub const DEFAULT_MAX_PACKET_LEN: usize = 512;

/// Size of the smallest well-formed metadata packet: empty host and units, a one-byte name, and the shortest type
/// label.
pub const SMALLEST_VALID_PACKET_LEN: usize = 60;

/// Kind of packet being written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketKind {
    /// Metadata (`gmetadata_full`) packet.
    Metadata,

    /// Value packet.
    Value,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Metadata => f.write_str("metadata"),
            PacketKind::Value => f.write_str("value"),
        }
    }
}

/// Errors that could occur while encoding a metric into packets.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EncodeError {
    /// The metric has an empty name.
    #[error("metric name must not be empty")]
    EmptyMetricName,

    /// The encoded packet exceeds the maximum packet length.
    #[error("{packet} packet is {len} bytes, exceeding the maximum of {max} bytes")]
    PacketTooLarge {
        /// Kind of packet that overflowed.
        packet: PacketKind,

        /// Length of the encoded packet.
        len: usize,

        /// Maximum packet length.
        max: usize,
    },
}

/// Encodes metrics into Ganglia metadata and value packets.
///
/// Encoding is a pure function of the inputs: no state is carried between calls, and identical inputs always produce
/// identical packets. Packets that would exceed the maximum packet length are rejected whole rather than truncated,
/// since `gmond` has no way to detect a truncated payload.
#[derive(Clone, Copy, Debug)]
pub struct PacketWriter {
    max_packet_len: usize,
    verbose: bool,
}

impl PacketWriter {
    /// Creates a new `PacketWriter` with the given maximum packet length.
    pub fn new(max_packet_len: usize) -> Self {
        PacketWriter { max_packet_len, verbose: false }
    }

    /// Sets whether or not each encoded packet is dumped at the trace level.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Gets the maximum packet length.
    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }

    /// Encodes the metadata packet for `descriptor`, sent from `origin`.
    ///
    /// # Errors
    ///
    /// If the metric name is empty, or the encoded packet exceeds the maximum packet length, an error is returned.
    pub fn metadata_packet(
        &self,
        origin: Origin<'_>,
        descriptor: &MetricDescriptor,
    ) -> Result<Bytes, EncodeError> {
        let name = validated_name(descriptor)?;
        let value_type = descriptor.value_type().as_str();
        let group = descriptor.group();
        let spoof = if origin.is_spoofed() { Some(origin.host()) } else { None };

        let mut extra = Vec::with_capacity(2);
        if let Some(spoof) = spoof {
            extra.push((SPOOF_HOST_KEY, spoof));
        }
        if let Some(group) = group {
            extra.push((GROUP_KEY, group));
        }

        let len = 4
            + encoded_string_len(origin.host().as_bytes())
            + encoded_string_len(name.as_bytes())
            + 4
            + encoded_string_len(value_type.as_bytes())
            + encoded_string_len(name.as_bytes())
            + encoded_string_len(descriptor.units().as_bytes())
            + 4 * 4
            + extra
                .iter()
                .map(|(k, v)| encoded_string_len(k.as_bytes()) + encoded_string_len(v.as_bytes()))
                .sum::<usize>();
        self.check_len(PacketKind::Metadata, len)?;

        let mut buf = BytesMut::with_capacity(len);
        write_header(&mut buf, METADATA_PACKET_ID, origin, name);
        append_string(&mut buf, value_type);
        append_string(&mut buf, name);
        append_string(&mut buf, descriptor.units());
        append_integer(&mut buf, descriptor.slope().code());
        append_integer(&mut buf, descriptor.tmax());
        append_integer(&mut buf, descriptor.dmax());

        append_integer(&mut buf, extra.len() as u32);
        for (key, value) in extra {
            append_string(&mut buf, key);
            append_string(&mut buf, value);
        }

        Ok(self.finish(PacketKind::Metadata, buf))
    }

    /// Encodes the value packet for `descriptor`, sent from `origin`.
    ///
    /// # Errors
    ///
    /// If the metric name is empty, or the encoded packet exceeds the maximum packet length, an error is returned.
    pub fn value_packet(
        &self,
        origin: Origin<'_>,
        descriptor: &MetricDescriptor,
    ) -> Result<Bytes, EncodeError> {
        let name = validated_name(descriptor)?;

        let len = 4
            + encoded_string_len(origin.host().as_bytes())
            + encoded_string_len(name.as_bytes())
            + 4
            + encoded_string_len(VALUE_FORMAT.as_bytes())
            + encoded_string_len(descriptor.value().as_bytes());
        self.check_len(PacketKind::Value, len)?;

        let mut buf = BytesMut::with_capacity(len);
        write_header(&mut buf, VALUE_PACKET_ID, origin, name);
        append_string(&mut buf, VALUE_FORMAT);
        append_string(&mut buf, descriptor.value());

        Ok(self.finish(PacketKind::Value, buf))
    }

    fn check_len(&self, packet: PacketKind, len: usize) -> Result<(), EncodeError> {
        if len > self.max_packet_len {
            return Err(EncodeError::PacketTooLarge { packet, len, max: self.max_packet_len });
        }

        Ok(())
    }

    fn finish(&self, packet: PacketKind, buf: BytesMut) -> Bytes {
        debug_assert_eq!(buf.len() % 4, 0, "packets must stay XDR aligned");

        if self.verbose {
            trace!(%packet, len = buf.len(), bytes = %HexDump(&buf), "Encoded packet.");
        }

        buf.freeze()
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        PacketWriter::new(DEFAULT_MAX_PACKET_LEN)
    }
}

fn validated_name(descriptor: &MetricDescriptor) -> Result<&str, EncodeError> {
    match descriptor.name() {
        "" => Err(EncodeError::EmptyMetricName),
        name => Ok(name),
    }
}

fn write_header(buf: &mut BytesMut, packet_id: u32, origin: Origin<'_>, name: &str) {
    append_integer(buf, packet_id);
    append_string(buf, origin.host());
    append_string(buf, name);
    append_integer(buf, origin.spoof_flag());
}

struct HexDump<'a>(&'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(4).enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            for byte in chunk {
                write!(f, "{:02x}", byte)?;
            }
        }

        Ok(())
    }
}
