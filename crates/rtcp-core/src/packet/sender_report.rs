use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::Error;
use crate::time::NtpTimestamp;
use crate::{Result, RtpSsrc, RtpTimestamp};

use super::header::{expect_type, split_packet, RtcpHeader};
use super::report_block::RtcpReportBlock;
use super::RtcpPacketType;

/// RTCP Sender Report (SR) packet
/// Defined in RFC 3550 Section 6.4.1
///
/// ```text
///        0                   1                   2                   3
///        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// header |V=2|P|    RC   |   PT=SR=200   |             length            |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                         SSRC of sender                        |
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// sender |              NTP timestamp, most significant word             |
/// info   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |             NTP timestamp, least significant word             |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                         RTP timestamp                         |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                     sender's packet count                     |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                      sender's octet count                     |
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
///       |                  report blocks (24 bytes each)                |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSenderReport {
    /// SSRC of the sender
    pub ssrc: RtpSsrc,

    /// Wall-clock time when this report was sent
    pub ntp_timestamp: NtpTimestamp,

    /// Sender's media clock at the same instant
    pub rtp_timestamp: RtpTimestamp,

    /// Total RTP data packets sent (wraps at 2^32)
    pub sender_packet_count: u32,

    /// Total RTP payload octets sent (wraps at 2^32)
    pub sender_octet_count: u32,

    /// Reception report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpSenderReport {
    /// SSRC plus sender info
    pub const PAYLOAD_SIZE: usize = 24;

    /// Header plus SSRC plus sender info
    pub const MIN_SIZE: usize = RtcpHeader::SIZE + Self::PAYLOAD_SIZE;

    /// Create a new sender report with zeroed counters
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            ntp_timestamp: NtpTimestamp::default(),
            rtp_timestamp: 0,
            sender_packet_count: 0,
            sender_octet_count: 0,
            report_blocks: Vec::new(),
        }
    }

    /// Add a report block
    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Encoded size in bytes including the header
    pub fn size(&self) -> usize {
        Self::MIN_SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Encode the complete SR packet
    pub fn encode(&self) -> Result<Bytes> {
        let header = RtcpHeader::for_body(
            RtcpPacketType::SenderReport as u8,
            self.report_blocks.len(),
            self.size() - RtcpHeader::SIZE,
        )?;

        let mut buf = BytesMut::with_capacity(header.packet_size());
        header.write(&mut buf);
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_timestamp.to_u64());
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.sender_packet_count);
        buf.put_u32(self.sender_octet_count);
        for block in &self.report_blocks {
            block.encode_into(&mut buf)?;
        }

        Ok(buf.freeze())
    }

    /// Decode a complete SR packet
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (header, payload) = split_packet(buf, Self::MIN_SIZE)?;
        expect_type(&header, RtcpPacketType::SenderReport as u8)?;
        decode_body(&header, payload)
    }
}

/// Decode SR contents following an already validated header
pub(crate) fn decode_body(header: &RtcpHeader, payload: &[u8]) -> Result<RtcpSenderReport> {
    let required = RtcpSenderReport::PAYLOAD_SIZE + header.count as usize * RtcpReportBlock::SIZE;
    if payload.len() < required {
        return Err(Error::malformed(format!(
            "SR with {} report blocks needs {} payload bytes, length allows {}",
            header.count,
            required,
            payload.len()
        )));
    }

    let mut buf = payload;
    let ssrc = buf.get_u32();
    let ntp_timestamp = NtpTimestamp::from_u64(buf.get_u64());
    let rtp_timestamp = buf.get_u32();
    let sender_packet_count = buf.get_u32();
    let sender_octet_count = buf.get_u32();

    let mut report_blocks = Vec::with_capacity(header.count as usize);
    for _ in 0..header.count {
        report_blocks.push(RtcpReportBlock::decode_from(&mut buf)?);
    }

    if buf.has_remaining() {
        trace!("ignoring {} bytes of SR profile extension", buf.remaining());
    }

    Ok(RtcpSenderReport {
        ssrc,
        ntp_timestamp,
        rtp_timestamp,
        sender_packet_count,
        sender_octet_count,
        report_blocks,
    })
}
