//! RTCP Packet module
//!
//! This module provides structures for handling RTCP packets as defined in RFC 3550.
//! It includes implementations for the SR, RR, SDES, BYE and APP packet types,
//! a tagged [`RtcpPacket`] enum for dispatch on the packet-type byte, and the
//! compound packet reader/writer.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::hex_dump;
use crate::error::Error;
use crate::Result;

mod app;
mod bye;
pub mod compound;
mod header;
mod receiver_report;
mod report_block;
mod sdes;
mod sender_report;

pub use app::RtcpApplicationDefined;
pub use bye::RtcpGoodbye;
pub use compound::{
    decode_compound, encode_compound, validate_compound_order, CompoundReader, CompoundWriter,
    UnknownPacketPolicy,
};
pub use header::{RtcpHeader, MAX_COUNT};
pub use receiver_report::RtcpReceiverReport;
pub use report_block::{clamp_cumulative_lost, RtcpReportBlock, CUMULATIVE_LOST_MAX, CUMULATIVE_LOST_MIN};
pub use sdes::{RtcpSdesChunk, RtcpSdesItem, RtcpSdesItemType, RtcpSourceDescription};
pub use sender_report::RtcpSenderReport;

/// RTCP version (same as RTP, always 2)
pub const RTCP_VERSION: u8 = 2;

/// RTCP packet types as defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RtcpPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Goodbye = 203,

    /// Application-Defined (APP)
    ApplicationDefined = 204,
}

impl TryFrom<u8> for RtcpPacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            200 => Ok(RtcpPacketType::SenderReport),
            201 => Ok(RtcpPacketType::ReceiverReport),
            202 => Ok(RtcpPacketType::SourceDescription),
            203 => Ok(RtcpPacketType::Goodbye),
            204 => Ok(RtcpPacketType::ApplicationDefined),
            _ => Err(Error::UnknownPacketType {
                packet_type: value,
                length: 0,
            }),
        }
    }
}

/// RTCP packet variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    /// Sender Report (SR)
    SenderReport(RtcpSenderReport),

    /// Receiver Report (RR)
    ReceiverReport(RtcpReceiverReport),

    /// Source Description (SDES)
    SourceDescription(RtcpSourceDescription),

    /// Goodbye (BYE)
    Goodbye(RtcpGoodbye),

    /// Application-Defined (APP)
    ApplicationDefined(RtcpApplicationDefined),

    /// Packet type this crate does not interpret, kept verbatim
    Unknown {
        /// Raw packet type byte
        packet_type: u8,
        /// Raw 5-bit count field
        count: u8,
        /// Everything after the header
        payload: Bytes,
    },
}

impl RtcpPacket {
    /// Decode one complete RTCP packet
    ///
    /// Fails with [`Error::UnknownPacketType`] for types other than 200-204;
    /// use [`RtcpPacket::decode_unknown`] to keep such packets instead.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RtcpHeader::SIZE {
            return Err(Error::truncated(RtcpHeader::SIZE, buf.len()));
        }
        let header = RtcpHeader::peek(buf)?;
        if header.version != RTCP_VERSION {
            return Err(Error::malformed(format!("invalid RTCP version {}", header.version)));
        }

        let packet_type = RtcpPacketType::try_from(header.packet_type).map_err(|_| Error::UnknownPacketType {
            packet_type: header.packet_type,
            length: header.length,
        })?;

        trace!("decoding RTCP {:?}: [{}]", packet_type, hex_dump(buf));

        let packet = match packet_type {
            RtcpPacketType::SenderReport => RtcpPacket::SenderReport(RtcpSenderReport::decode(buf)?),
            RtcpPacketType::ReceiverReport => RtcpPacket::ReceiverReport(RtcpReceiverReport::decode(buf)?),
            RtcpPacketType::SourceDescription => {
                RtcpPacket::SourceDescription(RtcpSourceDescription::decode(buf)?)
            }
            RtcpPacketType::Goodbye => RtcpPacket::Goodbye(RtcpGoodbye::decode(buf)?),
            RtcpPacketType::ApplicationDefined => {
                RtcpPacket::ApplicationDefined(RtcpApplicationDefined::decode(buf)?)
            }
        };
        Ok(packet)
    }

    /// Wrap a packet of any type as [`RtcpPacket::Unknown`] after validating its framing
    pub fn decode_unknown(buf: &[u8]) -> Result<Self> {
        if buf.len() < RtcpHeader::SIZE {
            return Err(Error::truncated(RtcpHeader::SIZE, buf.len()));
        }
        let header = RtcpHeader::peek(buf)?;
        if header.version != RTCP_VERSION {
            return Err(Error::malformed(format!("invalid RTCP version {}", header.version)));
        }
        if header.packet_size() != buf.len() {
            return Err(Error::malformed(format!(
                "header declares {} bytes but packet has {}",
                header.packet_size(),
                buf.len()
            )));
        }
        Ok(RtcpPacket::Unknown {
            packet_type: header.packet_type,
            count: header.count,
            payload: Bytes::copy_from_slice(&buf[RtcpHeader::SIZE..]),
        })
    }

    /// Encode the packet including its header
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            RtcpPacket::SenderReport(sr) => sr.encode(),
            RtcpPacket::ReceiverReport(rr) => rr.encode(),
            RtcpPacket::SourceDescription(sdes) => sdes.encode(),
            RtcpPacket::Goodbye(bye) => bye.encode(),
            RtcpPacket::ApplicationDefined(app) => app.encode(),
            RtcpPacket::Unknown {
                packet_type,
                count,
                payload,
            } => {
                let header = RtcpHeader::for_body(*packet_type, *count as usize, payload.len())?;
                let mut buf = BytesMut::with_capacity(header.packet_size());
                header.write(&mut buf);
                buf.put_slice(payload);
                Ok(buf.freeze())
            }
        }
    }

    /// Raw packet type byte
    pub fn packet_type(&self) -> u8 {
        match self {
            RtcpPacket::SenderReport(_) => RtcpPacketType::SenderReport as u8,
            RtcpPacket::ReceiverReport(_) => RtcpPacketType::ReceiverReport as u8,
            RtcpPacket::SourceDescription(_) => RtcpPacketType::SourceDescription as u8,
            RtcpPacket::Goodbye(_) => RtcpPacketType::Goodbye as u8,
            RtcpPacket::ApplicationDefined(_) => RtcpPacketType::ApplicationDefined as u8,
            RtcpPacket::Unknown { packet_type, .. } => *packet_type,
        }
    }

    /// Packet type if it is one of the RFC 3550 types
    pub fn kind(&self) -> Option<RtcpPacketType> {
        RtcpPacketType::try_from(self.packet_type()).ok()
    }
}

impl From<RtcpSenderReport> for RtcpPacket {
    fn from(sr: RtcpSenderReport) -> Self {
        RtcpPacket::SenderReport(sr)
    }
}

impl From<RtcpReceiverReport> for RtcpPacket {
    fn from(rr: RtcpReceiverReport) -> Self {
        RtcpPacket::ReceiverReport(rr)
    }
}

impl From<RtcpSourceDescription> for RtcpPacket {
    fn from(sdes: RtcpSourceDescription) -> Self {
        RtcpPacket::SourceDescription(sdes)
    }
}

impl From<RtcpGoodbye> for RtcpPacket {
    fn from(bye: RtcpGoodbye) -> Self {
        RtcpPacket::Goodbye(bye)
    }
}

impl From<RtcpApplicationDefined> for RtcpPacket {
    fn from(app: RtcpApplicationDefined) -> Self {
        RtcpPacket::ApplicationDefined(app)
    }
}

/// Inside a length-validated packet, running out of bytes means the counts lie
pub(crate) fn truncation_is_malformed(err: Error) -> Error {
    match err {
        Error::TruncatedInput { required, available } => Error::malformed(format!(
            "contents overrun declared length: need {} bytes, {} left",
            required, available
        )),
        other => other,
    }
}
