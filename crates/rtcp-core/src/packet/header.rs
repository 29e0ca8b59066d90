use bytes::{Buf, BufMut};
use tracing::trace;

use crate::codec::ensure_remaining;
use crate::error::Error;
use crate::Result;

use super::RTCP_VERSION;

/// Maximum value of the 5-bit count field (report blocks, chunks, sources)
pub const MAX_COUNT: usize = 31;

/// RTCP common header
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|    RC   |      PT       |             length            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    /// Protocol version, always 2
    pub version: u8,

    /// Padding octets follow the payload
    pub padding: bool,

    /// Report count, source count or subtype depending on the packet type
    pub count: u8,

    /// Packet type discriminator
    pub packet_type: u8,

    /// Packet length in 32-bit words minus one
    pub length: u16,
}

impl RtcpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 4;

    /// Build the header for a body of `body_len` bytes
    ///
    /// The body must already be padded to a 32-bit boundary.
    pub fn for_body(packet_type: u8, count: usize, body_len: usize) -> Result<Self> {
        if count > MAX_COUNT {
            return Err(Error::invalid_field(format!(
                "count {} does not fit the 5-bit header field",
                count
            )));
        }
        if body_len % 4 != 0 {
            return Err(Error::invalid_field(format!(
                "body of {} bytes is not 32-bit aligned",
                body_len
            )));
        }
        let words = body_len / 4;
        if words > u16::MAX as usize {
            return Err(Error::invalid_field(format!("body of {} bytes is too long", body_len)));
        }
        Ok(Self {
            version: RTCP_VERSION,
            padding: false,
            count: count as u8,
            packet_type,
            length: words as u16,
        })
    }

    /// Total packet size in bytes including this header
    pub fn packet_size(&self) -> usize {
        (self.length as usize + 1) * 4
    }

    /// Parse a header from the front of `buf`
    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(&*buf, Self::SIZE)?;

        let first = buf.get_u8();
        let packet_type = buf.get_u8();
        let length = buf.get_u16();
        Ok(Self {
            version: first >> 6,
            padding: (first >> 5) & 0x01 == 1,
            count: first & 0x1F,
            packet_type,
            length,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        let first = (self.version << 6) | ((self.padding as u8) << 5) | (self.count & 0x1F);
        buf.put_u8(first);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.length);
    }

    /// Peek at the header of the packet starting at `buf[0]`
    pub fn peek(mut buf: &[u8]) -> Result<Self> {
        Self::read(&mut buf)
    }
}

/// Validate a complete packet and return its header and payload
///
/// `min_size` is the smallest buffer the caller's packet type can be decoded
/// from; anything shorter is truncated input. After that the header must be
/// version 2, its length must describe exactly `buf`, and any padding must fit
/// in the payload. The returned payload has the padding removed.
pub(crate) fn split_packet(buf: &[u8], min_size: usize) -> Result<(RtcpHeader, &[u8])> {
    let min_size = min_size.max(RtcpHeader::SIZE);
    if buf.len() < min_size {
        return Err(Error::truncated(min_size, buf.len()));
    }

    let mut rest = buf;
    let header = RtcpHeader::read(&mut rest)?;

    if header.version != RTCP_VERSION {
        return Err(Error::malformed(format!("invalid RTCP version {}", header.version)));
    }

    let declared = header.packet_size();
    if declared != buf.len() {
        return Err(Error::malformed(format!(
            "header declares {} bytes but packet has {}",
            declared,
            buf.len()
        )));
    }

    let mut payload = rest;
    if header.padding {
        let pad = payload.last().copied().unwrap_or(0) as usize;
        if pad == 0 || pad > payload.len() {
            return Err(Error::malformed(format!(
                "padding count {} invalid for {} byte payload",
                pad,
                payload.len()
            )));
        }
        payload = &payload[..payload.len() - pad];
        trace!("stripped {} padding bytes from RTCP type {}", pad, header.packet_type);
    }

    Ok((header, payload))
}

/// Check the header carries the type the caller is decoding
pub(crate) fn expect_type(header: &RtcpHeader, packet_type: u8) -> Result<()> {
    if header.packet_type != packet_type {
        return Err(Error::malformed(format!(
            "expected packet type {} but found {}",
            packet_type, header.packet_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_write_read() {
        let header = RtcpHeader::for_body(200, 1, 48).unwrap();
        assert_eq!(header.length, 12);
        assert_eq!(header.packet_size(), 52);

        let mut bytes = BytesMut::with_capacity(RtcpHeader::SIZE);
        header.write(&mut bytes);
        assert_eq!(&bytes[..], &[0x81, 200, 0x00, 0x0c]);

        assert_eq!(RtcpHeader::peek(&bytes).unwrap(), header);
    }

    #[test]
    fn test_padding_bit() {
        let header = RtcpHeader::peek(&[0xA2, 203, 0x00, 0x01]).unwrap();
        assert_eq!(header.version, 2);
        assert!(header.padding);
        assert_eq!(header.count, 2);
        assert_eq!(header.packet_type, 203);
    }

    #[test]
    fn test_for_body_limits() {
        assert!(matches!(RtcpHeader::for_body(201, 32, 4), Err(Error::InvalidFieldValue(_))));
        assert!(matches!(RtcpHeader::for_body(201, 0, 6), Err(Error::InvalidFieldValue(_))));
        assert!(RtcpHeader::for_body(201, 31, 4 + 31 * 24).is_ok());
    }

    #[test]
    fn test_split_packet_validation() {
        // Too short for the caller's minimum
        assert_eq!(
            split_packet(&[0x80, 201, 0x00], 8),
            Err(Error::TruncatedInput { required: 8, available: 3 })
        );

        // Wrong version
        let bad_version = [0x40, 201, 0x00, 0x01, 0, 0, 0, 1];
        assert!(matches!(split_packet(&bad_version, 8), Err(Error::MalformedPacket(_))));

        // Length says 3 words but only 1 present
        let too_long = [0x80, 201, 0x00, 0x02, 0, 0, 0, 1];
        assert!(matches!(split_packet(&too_long, 8), Err(Error::MalformedPacket(_))));

        // Padding count larger than the payload
        let bad_pad = [0xA0, 201, 0x00, 0x01, 0, 0, 0, 9];
        assert!(matches!(split_packet(&bad_pad, 8), Err(Error::MalformedPacket(_))));

        // Valid padding is stripped
        let padded = [0xA0, 204, 0x00, 0x02, 1, 2, 3, 4, 0, 0, 0, 4];
        let (header, payload) = split_packet(&padded, 4).unwrap();
        assert!(header.padding);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }
}
