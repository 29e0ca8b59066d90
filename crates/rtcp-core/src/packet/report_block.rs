use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::ensure_remaining;
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Smallest value of the signed 24-bit cumulative lost field
pub const CUMULATIVE_LOST_MIN: i32 = -(1 << 23);

/// Largest value of the signed 24-bit cumulative lost field
pub const CUMULATIVE_LOST_MAX: i32 = (1 << 23) - 1;

/// Report block in RTCP SR/RR packets
/// Defined in RFC 3550 Section 6.4.1 and 6.4.2
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 SSRC_1 (SSRC of first source)                 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | fraction lost |       cumulative number of packets lost       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           extended highest sequence number received           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      interarrival jitter                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         last SR (LSR)                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   delay since last SR (DLSR)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReportBlock {
    /// SSRC identifier of the source this report is for
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since last report (0-255 where 256 = 100%)
    pub fraction_lost: u8,

    /// Cumulative number of packets lost, signed 24-bit on the wire
    ///
    /// Negative when duplicates outnumber losses.
    pub cumulative_lost: i32,

    /// Extended highest sequence number received (cycles << 16 | seq)
    pub highest_seq: u32,

    /// Interarrival jitter estimate in RTP timestamp units
    pub jitter: u32,

    /// Middle 32 bits of the NTP timestamp of the last SR from this source
    pub last_sr: u32,

    /// Delay since last SR from this source (in units of 1/65536 seconds)
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Size of a report block in bytes
    pub const SIZE: usize = 24;

    /// Create a new empty report block
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            fraction_lost: 0,
            cumulative_lost: 0,
            highest_seq: 0,
            jitter: 0,
            last_sr: 0,
            delay_since_last_sr: 0,
        }
    }

    /// Decode a standalone report block from the first 24 bytes of `buf`
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        Self::decode_from(&mut buf)
    }

    /// Encode a standalone report block
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    pub(crate) fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(&*buf, Self::SIZE)?;

        let ssrc = buf.get_u32();

        // Fraction lost (8 bits) + cumulative lost (24 bits, two's complement)
        let fraction_lost = buf.get_u8();
        let cumulative_lost = ((buf.get_uint(3) as u32) << 8) as i32 >> 8;

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            highest_seq: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sr: buf.get_u32(),
            delay_since_last_sr: buf.get_u32(),
        })
    }

    /// Append the 24-byte block to `buf`
    ///
    /// Nothing is written when the block fails validation.
    pub(crate) fn encode_into(&self, buf: &mut impl BufMut) -> Result<()> {
        if !(CUMULATIVE_LOST_MIN..=CUMULATIVE_LOST_MAX).contains(&self.cumulative_lost) {
            return Err(Error::invalid_field(format!(
                "cumulative lost {} does not fit in 24 bits",
                self.cumulative_lost
            )));
        }

        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        buf.put_uint((self.cumulative_lost as u32 & 0x00FF_FFFF) as u64, 3);
        buf.put_u32(self.highest_seq);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sr);
        buf.put_u32(self.delay_since_last_sr);
        Ok(())
    }

    /// Fraction lost as a ratio between 0.0 and 1.0
    pub fn fraction_lost_ratio(&self) -> f64 {
        self.fraction_lost as f64 / 256.0
    }
}

/// Clamp a computed cumulative loss into the signed 24-bit wire range
pub fn clamp_cumulative_lost(lost: i64) -> i32 {
    lost.clamp(CUMULATIVE_LOST_MIN as i64, CUMULATIVE_LOST_MAX as i64) as i32
}
