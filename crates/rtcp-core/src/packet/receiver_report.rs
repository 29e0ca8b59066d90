use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::Error;
use crate::{Result, RtpSsrc};

use super::header::{expect_type, split_packet, RtcpHeader};
use super::report_block::RtcpReportBlock;
use super::RtcpPacketType;

/// RTCP Receiver Report (RR) packet
/// Defined in RFC 3550 Section 6.4.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReceiverReport {
    /// SSRC of the receiver
    pub ssrc: RtpSsrc,

    /// Report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpReceiverReport {
    /// Header plus reporter SSRC
    pub const MIN_SIZE: usize = RtcpHeader::SIZE + 4;

    /// Create a new receiver report
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            report_blocks: Vec::new(),
        }
    }

    /// Add a report block
    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Calculate the total size in bytes including the header
    pub fn size(&self) -> usize {
        Self::MIN_SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Encode the complete RR packet
    pub fn encode(&self) -> Result<Bytes> {
        let header = RtcpHeader::for_body(
            RtcpPacketType::ReceiverReport as u8,
            self.report_blocks.len(),
            self.size() - RtcpHeader::SIZE,
        )?;

        let mut buf = BytesMut::with_capacity(header.packet_size());
        header.write(&mut buf);
        buf.put_u32(self.ssrc);
        for block in &self.report_blocks {
            block.encode_into(&mut buf)?;
        }

        Ok(buf.freeze())
    }

    /// Decode a complete RR packet
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (header, payload) = split_packet(buf, Self::MIN_SIZE)?;
        expect_type(&header, RtcpPacketType::ReceiverReport as u8)?;
        decode_body(&header, payload)
    }
}

pub(crate) fn decode_body(header: &RtcpHeader, payload: &[u8]) -> Result<RtcpReceiverReport> {
    let required = 4 + header.count as usize * RtcpReportBlock::SIZE;
    if payload.len() < required {
        return Err(Error::malformed(format!(
            "RR with {} report blocks needs {} payload bytes, length allows {}",
            header.count,
            required,
            payload.len()
        )));
    }

    let mut buf = payload;
    let ssrc = buf.get_u32();

    let mut report_blocks = Vec::with_capacity(header.count as usize);
    for _ in 0..header.count {
        report_blocks.push(RtcpReportBlock::decode_from(&mut buf)?);
    }

    if buf.has_remaining() {
        trace!("ignoring {} bytes of RR profile extension", buf.remaining());
    }

    Ok(RtcpReceiverReport { ssrc, report_blocks })
}
