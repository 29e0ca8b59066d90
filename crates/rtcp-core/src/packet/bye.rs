use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ensure_remaining, padding_for};
use crate::error::Error;
use crate::{Result, RtpSsrc};

use super::header::{expect_type, split_packet, RtcpHeader};
use super::{truncation_is_malformed, RtcpPacketType};

/// RTCP Goodbye (BYE) packet
/// Defined in RFC 3550 Section 6.6
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpGoodbye {
    /// SSRC/CSRC identifiers
    pub sources: Vec<RtpSsrc>,

    /// Reason for leaving (optional, at most 255 bytes)
    pub reason: Option<String>,
}

impl RtcpGoodbye {
    /// Create a new BYE packet
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            reason: None,
        }
    }

    /// Create a new BYE packet for a single source
    pub fn new_for_source(ssrc: RtpSsrc) -> Self {
        let mut bye = Self::new();
        bye.add_source(ssrc);
        bye
    }

    /// Create a new BYE packet for a single source with a reason
    pub fn new_with_reason(ssrc: RtpSsrc, reason: impl Into<String>) -> Self {
        let mut bye = Self::new_for_source(ssrc);
        bye.reason = Some(reason.into());
        bye
    }

    /// Add a source to the BYE packet
    pub fn add_source(&mut self, ssrc: RtpSsrc) {
        self.sources.push(ssrc);
    }

    /// Set the reason for leaving
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Size of the BYE packet in bytes including the header
    pub fn size(&self) -> usize {
        let mut size = RtcpHeader::SIZE + self.sources.len() * 4;

        // Length byte + text, padded to a 4-byte boundary
        if let Some(reason) = &self.reason {
            let reason_len = 1 + reason.len();
            size += reason_len + padding_for(reason_len);
        }

        size
    }

    pub fn encode(&self) -> Result<Bytes> {
        if let Some(reason) = &self.reason {
            if reason.len() > u8::MAX as usize {
                return Err(Error::invalid_field(format!(
                    "BYE reason of {} bytes exceeds 255",
                    reason.len()
                )));
            }
        }

        let header = RtcpHeader::for_body(
            RtcpPacketType::Goodbye as u8,
            self.sources.len(),
            self.size() - RtcpHeader::SIZE,
        )?;

        let mut buf = BytesMut::with_capacity(header.packet_size());
        header.write(&mut buf);
        for ssrc in &self.sources {
            buf.put_u32(*ssrc);
        }
        if let Some(reason) = &self.reason {
            buf.put_u8(reason.len() as u8);
            buf.put_slice(reason.as_bytes());
            buf.put_bytes(0, padding_for(1 + reason.len()));
        }

        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (header, payload) = split_packet(buf, RtcpHeader::SIZE)?;
        expect_type(&header, RtcpPacketType::Goodbye as u8)?;
        decode_body(&header, payload)
    }
}

pub(crate) fn decode_body(header: &RtcpHeader, payload: &[u8]) -> Result<RtcpGoodbye> {
    let mut buf = payload;
    decode_sources_and_reason(header.count, &mut buf).map_err(truncation_is_malformed)
}

fn decode_sources_and_reason(count: u8, buf: &mut &[u8]) -> Result<RtcpGoodbye> {
    ensure_remaining(&*buf, count as usize * 4)?;
    let sources = (0..count).map(|_| buf.get_u32()).collect();

    let reason = if buf.has_remaining() {
        let reason_len = buf.get_u8() as usize;
        ensure_remaining(&*buf, reason_len)?;
        let text = String::from_utf8_lossy(&buf[..reason_len]).into_owned();
        buf.advance(reason_len);
        Some(text)
    } else {
        None
    };

    Ok(RtcpGoodbye { sources, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bye_creation() {
        let bye = RtcpGoodbye::new();
        assert!(bye.sources.is_empty());
        assert!(bye.reason.is_none());

        let bye = RtcpGoodbye::new_with_reason(0x12345678, "Leaving session");
        assert_eq!(bye.sources, vec![0x12345678]);
        assert_eq!(bye.reason.as_deref(), Some("Leaving session"));
    }

    #[test]
    fn test_size_calculation() {
        assert_eq!(RtcpGoodbye::new().size(), 4);
        assert_eq!(RtcpGoodbye::new_for_source(1).size(), 8);

        // SSRC (4) + length (1) + "Bye" (3) + padding (0)
        assert_eq!(RtcpGoodbye::new_with_reason(1, "Bye").size(), 12);
        // SSRC (4) + length (1) + "Goodbye" (7) + padding (0)
        assert_eq!(RtcpGoodbye::new_with_reason(1, "Goodbye").size(), 16);
        // SSRC (4) + length (1) + "A" (1) + padding (2)
        assert_eq!(RtcpGoodbye::new_with_reason(1, "A").size(), 12);
    }

    #[test]
    fn test_serialize_parse() {
        let original = RtcpGoodbye::new_for_source(0x12345678);
        let bytes = original.encode().unwrap();
        assert_eq!(&bytes[..], &[0x81, 203, 0x00, 0x01, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(RtcpGoodbye::decode(&bytes).unwrap(), original);

        let mut original = RtcpGoodbye::new();
        original.add_source(0x12345678);
        original.add_source(0xabcdef01);
        original.set_reason("Leaving session");

        let bytes = original.encode().unwrap();
        assert_eq!(bytes.len(), original.size());
        assert_eq!(RtcpGoodbye::decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_source_count_beyond_payload() {
        let mut bytes = RtcpGoodbye::new_for_source(1).encode().unwrap().to_vec();
        bytes[0] = 0x83;
        assert!(matches!(RtcpGoodbye::decode(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_reason_longer_than_payload() {
        let mut bytes = RtcpGoodbye::new_with_reason(1, "Bye").encode().unwrap().to_vec();
        // Length byte claims 9 octets but only 3 follow
        bytes[8] = 9;
        assert!(matches!(RtcpGoodbye::decode(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_reason_padding_is_zeroed() {
        let bytes = RtcpGoodbye::new_with_reason(1, "A").encode().unwrap();
        assert_eq!(&bytes[8..], &[1, b'A', 0, 0]);
    }

    #[test]
    fn test_reason_too_long() {
        let bye = RtcpGoodbye::new_with_reason(1, "z".repeat(300));
        assert!(matches!(bye.encode(), Err(Error::InvalidFieldValue(_))));
    }
}
