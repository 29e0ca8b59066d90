//! RTCP compound packets
//!
//! RTCP packets travel as compound packets: several complete packets stacked
//! back to back in one datagram, each framed by its own header length
//! (RFC 3550 Section 6.1). [`CompoundReader`] walks such a buffer lazily,
//! [`CompoundWriter`] builds one.

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::hex_dump;
use crate::error::Error;
use crate::Result;

use super::header::RtcpHeader;
use super::{truncation_is_malformed, RtcpPacket, RtcpPacketType, RTCP_VERSION};

/// What the reader does with packet types it does not recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPacketPolicy {
    /// Skip over the packet using its header length
    #[default]
    Skip,

    /// Yield it as [`RtcpPacket::Unknown`]
    Keep,
}

/// Lazy iterator over the sub-packets of a compound RTCP packet
///
/// Each call to `next` decodes one sub-packet. The first malformed
/// sub-packet is yielded as an error and ends the iteration.
#[derive(Debug, Clone)]
pub struct CompoundReader<'a> {
    buf: &'a [u8],
    offset: usize,
    policy: UnknownPacketPolicy,
    skipped: usize,
    done: bool,
}

impl<'a> CompoundReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_policy(buf, UnknownPacketPolicy::default())
    }

    pub fn with_policy(buf: &'a [u8], policy: UnknownPacketPolicy) -> Self {
        Self {
            buf,
            offset: 0,
            policy,
            skipped: 0,
            done: false,
        }
    }

    /// Start again from the first sub-packet
    pub fn restart(&mut self) {
        self.offset = 0;
        self.skipped = 0;
        self.done = false;
    }

    /// Byte offset of the next sub-packet
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Number of unknown sub-packets skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn fail(&mut self, err: Error) -> Option<Result<RtcpPacket>> {
        warn!("dropping rest of RTCP compound at offset {}: {}", self.offset, err);
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for CompoundReader<'_> {
    type Item = Result<RtcpPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.offset >= self.buf.len() {
                return None;
            }

            let rest = &self.buf[self.offset..];
            if rest.len() < RtcpHeader::SIZE {
                return self.fail(Error::malformed(format!(
                    "{} trailing bytes are too short for an RTCP header",
                    rest.len()
                )));
            }

            let header = match RtcpHeader::peek(rest) {
                Ok(header) => header,
                Err(err) => return self.fail(truncation_is_malformed(err)),
            };
            if header.version != RTCP_VERSION {
                return self.fail(Error::malformed(format!("invalid RTCP version {}", header.version)));
            }

            let size = header.packet_size();
            if size > rest.len() {
                return self.fail(Error::malformed(format!(
                    "sub-packet declares {} bytes but only {} remain",
                    size,
                    rest.len()
                )));
            }

            let packet = &rest[..size];
            self.offset += size;

            if RtcpPacketType::try_from(header.packet_type).is_err() {
                match self.policy {
                    UnknownPacketPolicy::Skip => {
                        self.skipped += 1;
                        trace!(
                            "skipping unknown RTCP packet type {} ({} bytes): [{}]",
                            header.packet_type,
                            size,
                            hex_dump(packet)
                        );
                        continue;
                    }
                    UnknownPacketPolicy::Keep => {
                        return match RtcpPacket::decode_unknown(packet) {
                            Ok(unknown) => Some(Ok(unknown)),
                            Err(err) => self.fail(truncation_is_malformed(err)),
                        };
                    }
                }
            }

            return match RtcpPacket::decode(packet) {
                Ok(decoded) => Some(Ok(decoded)),
                Err(err) => self.fail(truncation_is_malformed(err)),
            };
        }
    }
}

impl std::iter::FusedIterator for CompoundReader<'_> {}

/// Decode every sub-packet of a compound packet, failing on the first error
pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>> {
    if buf.len() < RtcpHeader::SIZE {
        return Err(Error::truncated(RtcpHeader::SIZE, buf.len()));
    }
    CompoundReader::new(buf).collect()
}

/// Builder that concatenates encoded RTCP packets into a compound packet
#[derive(Debug, Default)]
pub struct CompoundWriter {
    buf: BytesMut,
    packets: usize,
}

impl CompoundWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `packet` and append it
    pub fn push(&mut self, packet: &RtcpPacket) -> Result<&mut Self> {
        let encoded = packet.encode()?;
        Ok(self.push_encoded(encoded))
    }

    /// Append an already encoded packet as is
    pub fn push_encoded(&mut self, packet: Bytes) -> &mut Self {
        self.buf.extend_from_slice(&packet);
        self.packets += 1;
        self
    }

    /// Number of packets appended
    pub fn packet_count(&self) -> usize {
        self.packets
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encode `packets` back to back in the given order
pub fn encode_compound(packets: &[RtcpPacket]) -> Result<Bytes> {
    let mut writer = CompoundWriter::new();
    for packet in packets {
        writer.push(packet)?;
    }
    Ok(writer.finish())
}

/// Check the RFC 3550 Section 6.1 rule that a compound starts with SR or RR
pub fn validate_compound_order(packets: &[RtcpPacket]) -> Result<()> {
    match packets.first() {
        None => Err(Error::malformed("compound packet is empty")),
        Some(RtcpPacket::SenderReport(_)) | Some(RtcpPacket::ReceiverReport(_)) => Ok(()),
        Some(first) => Err(Error::malformed(format!(
            "compound packet starts with type {} instead of SR or RR",
            first.packet_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{
        RtcpGoodbye, RtcpReceiverReport, RtcpReportBlock, RtcpSenderReport, RtcpSourceDescription,
    };
    use crate::time::NtpTimestamp;

    fn sender_report() -> RtcpSenderReport {
        let mut sr = RtcpSenderReport::new(0x1111);
        sr.ntp_timestamp = NtpTimestamp::new(3_900_000_000, 0x4000_0000);
        sr.rtp_timestamp = 160;
        sr.sender_packet_count = 1;
        sr.sender_octet_count = 160;
        sr
    }

    fn receiver_report() -> RtcpReceiverReport {
        let mut rr = RtcpReceiverReport::new(0x2222);
        rr.add_report_block(RtcpReportBlock::new(0x1111));
        rr
    }

    // [SR][type 210, two words of payload][RR]
    fn compound_with_unknown() -> Vec<u8> {
        let mut buf = sender_report().encode().unwrap().to_vec();
        buf.extend_from_slice(&[0x80, 210, 0x00, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 1, 2, 3, 4]);
        buf.extend_from_slice(&receiver_report().encode().unwrap());
        buf
    }

    #[test]
    fn test_unknown_packet_is_skipped() {
        let buf = compound_with_unknown();
        let packets = decode_compound(&buf).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], RtcpPacket::SenderReport(sender_report()));
        assert_eq!(packets[1], RtcpPacket::ReceiverReport(receiver_report()));

        let mut reader = CompoundReader::new(&buf);
        assert_eq!(reader.by_ref().count(), 2);
        assert_eq!(reader.skipped(), 1);
        assert_eq!(reader.position(), buf.len());
    }

    #[test]
    fn test_unknown_packet_is_kept() {
        let buf = compound_with_unknown();
        let packets: Vec<_> = CompoundReader::with_policy(&buf, UnknownPacketPolicy::Keep)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(
            packets[1],
            RtcpPacket::Unknown {
                packet_type: 210,
                count: 0,
                payload: Bytes::from_static(&[0xAA, 0xBB, 0xCC, 0xDD, 1, 2, 3, 4]),
            }
        );

        // Kept packets re-encode to the same bytes
        assert_eq!(&encode_compound(&packets).unwrap()[..], &buf[..]);
    }

    #[test]
    fn test_reader_is_lazy_and_restartable() {
        let buf = compound_with_unknown();
        let mut reader = CompoundReader::new(&buf);

        assert!(matches!(reader.next(), Some(Ok(RtcpPacket::SenderReport(_)))));
        let snapshot = reader.clone();
        assert!(matches!(reader.next(), Some(Ok(RtcpPacket::ReceiverReport(_)))));
        assert!(reader.next().is_none());

        let mut resumed = snapshot;
        assert!(matches!(resumed.next(), Some(Ok(RtcpPacket::ReceiverReport(_)))));

        reader.restart();
        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn test_overrunning_length_stops_iteration() {
        let mut buf = sender_report().encode().unwrap().to_vec();
        let mut rr = receiver_report().encode().unwrap().to_vec();
        // Declare one more word than present
        rr[3] += 1;
        buf.extend_from_slice(&rr);
        buf.extend_from_slice(&RtcpGoodbye::new_for_source(9).encode().unwrap());

        let mut reader = CompoundReader::new(&buf);
        assert!(matches!(reader.next(), Some(Ok(RtcpPacket::SenderReport(_)))));
        assert!(matches!(reader.next(), Some(Err(Error::MalformedPacket(_)))));
        assert!(reader.next().is_none());

        assert!(matches!(decode_compound(&buf), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_trailing_fragment_is_malformed() {
        let mut buf = receiver_report().encode().unwrap().to_vec();
        buf.extend_from_slice(&[0x80, 201]);

        let results: Vec<_> = CompoundReader::new(&buf).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_short_recognised_sub_packet_is_malformed() {
        // SR header claiming a single word of body
        let buf = [0x80, 200, 0x00, 0x01, 0, 0, 0, 1];
        assert!(matches!(decode_compound(&buf), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(CompoundReader::new(&[]).count(), 0);
        assert_eq!(
            decode_compound(&[]),
            Err(Error::TruncatedInput { required: 4, available: 0 })
        );
    }

    #[test]
    fn test_writer_concatenates_in_order() {
        let sr = sender_report();
        let sdes = RtcpSourceDescription::with_cname(0x1111, "alice@example.com");

        let mut writer = CompoundWriter::new();
        writer.push(&RtcpPacket::SenderReport(sr.clone())).unwrap();
        writer.push_encoded(sdes.encode().unwrap());
        assert_eq!(writer.packet_count(), 2);
        assert_eq!(writer.len(), sr.size() + sdes.size());

        let bytes = writer.finish();
        assert_eq!(&bytes[..sr.size()], &sr.encode().unwrap()[..]);

        let packets = decode_compound(&bytes).unwrap();
        assert_eq!(packets, vec![RtcpPacket::SenderReport(sr), RtcpPacket::SourceDescription(sdes)]);
        assert!(validate_compound_order(&packets).is_ok());
    }

    #[test]
    fn test_compound_order_check() {
        assert!(validate_compound_order(&[]).is_err());
        assert!(validate_compound_order(&[RtcpGoodbye::new_for_source(1).into()]).is_err());
        assert!(validate_compound_order(&[receiver_report().into()]).is_ok());
    }
}
