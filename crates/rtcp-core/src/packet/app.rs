use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

use super::header::{expect_type, split_packet, RtcpHeader, MAX_COUNT};
use super::RtcpPacketType;

/// RTCP Application-Defined (APP) packet
/// Defined in RFC 3550 Section 6.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpApplicationDefined {
    /// Application subtype carried in the count bits
    pub subtype: u8,

    /// SSRC/CSRC of the originator
    pub ssrc: RtpSsrc,

    /// Four ASCII characters naming the application
    pub name: [u8; 4],

    /// Application-dependent data, a multiple of 32 bits
    pub data: Bytes,
}

impl RtcpApplicationDefined {
    /// Header, SSRC and name
    pub const MIN_SIZE: usize = RtcpHeader::SIZE + 8;

    pub fn new(ssrc: RtpSsrc, name: [u8; 4]) -> Self {
        Self {
            subtype: 0,
            ssrc,
            name,
            data: Bytes::new(),
        }
    }

    /// Name as text, if it is valid ASCII
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok().filter(|s| s.is_ascii())
    }

    pub fn size(&self) -> usize {
        Self::MIN_SIZE + self.data.len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        if self.subtype as usize > MAX_COUNT {
            return Err(Error::invalid_field(format!("APP subtype {} exceeds 31", self.subtype)));
        }
        if self.data.len() % 4 != 0 {
            return Err(Error::invalid_field(format!(
                "APP data of {} bytes is not a multiple of 32 bits",
                self.data.len()
            )));
        }

        let header = RtcpHeader::for_body(
            RtcpPacketType::ApplicationDefined as u8,
            self.subtype as usize,
            self.size() - RtcpHeader::SIZE,
        )?;

        let mut buf = BytesMut::with_capacity(header.packet_size());
        header.write(&mut buf);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(&self.data);

        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (header, payload) = split_packet(buf, Self::MIN_SIZE)?;
        expect_type(&header, RtcpPacketType::ApplicationDefined as u8)?;
        decode_body(&header, payload)
    }
}

pub(crate) fn decode_body(header: &RtcpHeader, payload: &[u8]) -> Result<RtcpApplicationDefined> {
    if payload.len() < 8 {
        return Err(Error::malformed(format!(
            "APP payload of {} bytes is missing SSRC or name",
            payload.len()
        )));
    }

    let mut buf = payload;
    let ssrc = buf.get_u32();
    let mut name = [0u8; 4];
    buf.copy_to_slice(&mut name);

    Ok(RtcpApplicationDefined {
        subtype: header.count,
        ssrc,
        name,
        data: Bytes::copy_from_slice(buf),
    })
}
