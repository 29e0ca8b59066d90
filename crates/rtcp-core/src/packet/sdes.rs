use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ensure_remaining, padding_for};
use crate::error::Error;
use crate::{Result, RtpSsrc};

use super::header::{expect_type, split_packet, RtcpHeader};
use super::{truncation_is_malformed, RtcpPacketType};

/// RTCP Source Description (SDES) item types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtcpSdesItemType {
    /// Canonical name (CNAME)
    CName,

    /// User name (NAME)
    Name,

    /// E-mail address (EMAIL)
    Email,

    /// Phone number (PHONE)
    Phone,

    /// Geographic location (LOC)
    Location,

    /// Application or tool name (TOOL)
    Tool,

    /// Notice/status (NOTE)
    Note,

    /// Private extensions (PRIV), prefix and value kept together
    Private,

    /// Item type not defined by RFC 3550
    Other(u8),
}

impl RtcpSdesItemType {
    /// Item type value 0 terminates a chunk's item list
    pub const END: u8 = 0;

    pub fn as_u8(&self) -> u8 {
        match self {
            RtcpSdesItemType::CName => 1,
            RtcpSdesItemType::Name => 2,
            RtcpSdesItemType::Email => 3,
            RtcpSdesItemType::Phone => 4,
            RtcpSdesItemType::Location => 5,
            RtcpSdesItemType::Tool => 6,
            RtcpSdesItemType::Note => 7,
            RtcpSdesItemType::Private => 8,
            RtcpSdesItemType::Other(value) => *value,
        }
    }
}

impl From<u8> for RtcpSdesItemType {
    fn from(value: u8) -> Self {
        match value {
            1 => RtcpSdesItemType::CName,
            2 => RtcpSdesItemType::Name,
            3 => RtcpSdesItemType::Email,
            4 => RtcpSdesItemType::Phone,
            5 => RtcpSdesItemType::Location,
            6 => RtcpSdesItemType::Tool,
            7 => RtcpSdesItemType::Note,
            8 => RtcpSdesItemType::Private,
            other => RtcpSdesItemType::Other(other),
        }
    }
}

/// RTCP Source Description (SDES) item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesItem {
    /// Item type
    pub item_type: RtcpSdesItemType,

    /// Item value (at most 255 bytes of UTF-8)
    pub value: String,
}

impl RtcpSdesItem {
    pub fn new(item_type: RtcpSdesItemType, value: impl Into<String>) -> Self {
        Self {
            item_type,
            value: value.into(),
        }
    }

    /// Create a new CNAME item
    pub fn cname(value: impl Into<String>) -> Self {
        Self::new(RtcpSdesItemType::CName, value)
    }

    /// Create a new NAME item
    pub fn name(value: impl Into<String>) -> Self {
        Self::new(RtcpSdesItemType::Name, value)
    }

    /// Create a new TOOL item
    pub fn tool(value: impl Into<String>) -> Self {
        Self::new(RtcpSdesItemType::Tool, value)
    }

    fn encoded_len(&self) -> usize {
        2 + self.value.len()
    }
}

/// RTCP Source Description (SDES) chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesChunk {
    /// SSRC/CSRC identifier
    pub ssrc: RtpSsrc,

    /// SDES items
    pub items: Vec<RtcpSdesItem>,
}

impl RtcpSdesChunk {
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: RtcpSdesItem) {
        self.items.push(item);
    }

    /// First CNAME item of this chunk
    pub fn cname(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.item_type == RtcpSdesItemType::CName)
            .map(|item| item.value.as_str())
    }

    /// SSRC, items and the null terminator, padded to 32 bits
    fn encoded_len(&self) -> usize {
        let unpadded = 4 + self.items.iter().map(RtcpSdesItem::encoded_len).sum::<usize>() + 1;
        unpadded + padding_for(unpadded)
    }
}

/// RTCP Source Description (SDES) packet
/// Defined in RFC 3550 Section 6.5
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpSourceDescription {
    /// SDES chunks
    pub chunks: Vec<RtcpSdesChunk>,
}

impl RtcpSourceDescription {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// SDES packet announcing a single CNAME
    pub fn with_cname(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        let mut sdes = Self::new();
        let mut chunk = RtcpSdesChunk::new(ssrc);
        chunk.add_item(RtcpSdesItem::cname(cname));
        sdes.add_chunk(chunk);
        sdes
    }

    pub fn add_chunk(&mut self, chunk: RtcpSdesChunk) {
        self.chunks.push(chunk);
    }

    pub fn size(&self) -> usize {
        RtcpHeader::SIZE + self.chunks.iter().map(RtcpSdesChunk::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes> {
        for item in self.chunks.iter().flat_map(|chunk| chunk.items.iter()) {
            if item.value.len() > u8::MAX as usize {
                return Err(Error::invalid_field(format!(
                    "SDES item of {} bytes exceeds 255",
                    item.value.len()
                )));
            }
            if item.item_type.as_u8() == RtcpSdesItemType::END {
                return Err(Error::invalid_field("SDES item type 0 is reserved for the terminator"));
            }
        }

        let header = RtcpHeader::for_body(
            RtcpPacketType::SourceDescription as u8,
            self.chunks.len(),
            self.size() - RtcpHeader::SIZE,
        )?;

        let mut buf = BytesMut::with_capacity(header.packet_size());
        header.write(&mut buf);
        for chunk in &self.chunks {
            let start = buf.len();
            buf.put_u32(chunk.ssrc);
            for item in &chunk.items {
                buf.put_u8(item.item_type.as_u8());
                buf.put_u8(item.value.len() as u8);
                buf.put_slice(item.value.as_bytes());
            }
            // Null terminator plus padding
            buf.put_bytes(0, chunk.encoded_len() - (buf.len() - start));
        }

        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (header, payload) = split_packet(buf, RtcpHeader::SIZE)?;
        expect_type(&header, RtcpPacketType::SourceDescription as u8)?;
        decode_body(&header, payload)
    }
}

pub(crate) fn decode_body(header: &RtcpHeader, payload: &[u8]) -> Result<RtcpSourceDescription> {
    let mut buf = payload;
    let mut chunks = Vec::with_capacity(header.count as usize);

    for _ in 0..header.count {
        chunks.push(decode_chunk(&mut buf).map_err(truncation_is_malformed)?);
    }

    Ok(RtcpSourceDescription { chunks })
}

fn decode_chunk(buf: &mut &[u8]) -> Result<RtcpSdesChunk> {
    let start = buf.remaining();
    ensure_remaining(&*buf, 4)?;
    let mut chunk = RtcpSdesChunk::new(buf.get_u32());

    loop {
        ensure_remaining(&*buf, 1)?;
        let item_type = buf.get_u8();
        if item_type == RtcpSdesItemType::END {
            break;
        }
        ensure_remaining(&*buf, 1)?;
        let len = buf.get_u8() as usize;
        ensure_remaining(&*buf, len)?;
        let value = String::from_utf8_lossy(&buf[..len]).into_owned();
        buf.advance(len);
        chunk.add_item(RtcpSdesItem::new(RtcpSdesItemType::from(item_type), value));
    }

    // Skip the rest of the null padding up to the next word boundary
    let padding = padding_for(start - buf.remaining());
    ensure_remaining(&*buf, padding)?;
    buf.advance(padding);
    Ok(chunk)
}
