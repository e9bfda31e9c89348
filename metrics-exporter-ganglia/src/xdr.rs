//! XDR primitives used by the Ganglia wire protocol.
//!
//! Ganglia only needs two of the XDR types: unsigned 32-bit integers and variable-length opaque strings. Both are
//! written big-endian, and every item occupies a multiple of four bytes on the wire.

use bytes::BufMut;

const XDR_ALIGNMENT: usize = 4;
const PADDING: [u8; XDR_ALIGNMENT] = [0; XDR_ALIGNMENT];

/// Returns the number of zero bytes needed to pad `len` bytes out to the XDR alignment.
pub const fn padding_len(len: usize) -> usize {
    (XDR_ALIGNMENT - len % XDR_ALIGNMENT) % XDR_ALIGNMENT
}

/// Returns the number of bytes `value` occupies once encoded as an XDR string, including the length prefix.
pub const fn encoded_string_len(value: &[u8]) -> usize {
    XDR_ALIGNMENT + value.len() + padding_len(value.len())
}

/// Appends `value` as a big-endian, four-byte XDR unsigned integer.
pub fn append_integer<B: BufMut>(buf: &mut B, value: u32) {
    buf.put_u32(value);
}

/// Appends `value` as an XDR string: a four-byte length prefix, the raw bytes, then zero padding.
///
/// No character encoding validation is performed; the bytes are written as given.
pub fn append_string<B, S>(buf: &mut B, value: S)
where
    B: BufMut,
    S: AsRef<[u8]>,
{
    let value = value.as_ref();

    // Lengths past `u32::MAX` cannot fit into a packet anyway, and are rejected by the packet length check.
    append_integer(buf, value.len() as u32);
    buf.put_slice(value);
    buf.put_slice(&PADDING[..padding_len(value.len())]);
}
