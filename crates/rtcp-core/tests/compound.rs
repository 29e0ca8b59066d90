//! Compound packet framing and resilience

use bytes::Bytes;

use rtcp_core::packet::{
    validate_compound_order, RtcpReportBlock, RtcpSdesItemType, UnknownPacketPolicy,
};
use rtcp_core::prelude::*;
use rtcp_core::RtcpApplicationDefined;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rtcp_core=trace")
        .with_test_writer()
        .try_init();
}

fn typical_compound() -> Vec<RtcpPacket> {
    let mut sr = RtcpSenderReport::new(0x1111_1111);
    sr.ntp_timestamp = NtpTimestamp::new(3_900_000_000, 0x8000_0000);
    sr.rtp_timestamp = 160_000;
    sr.sender_packet_count = 1000;
    sr.sender_octet_count = 160_000;
    let mut block = RtcpReportBlock::new(0x2222_2222);
    block.fraction_lost = 12;
    block.cumulative_lost = -3;
    block.highest_seq = 0x0001_0005;
    block.jitter = 42;
    sr.add_report_block(block);

    vec![
        sr.into(),
        RtcpSourceDescription::with_cname(0x1111_1111, "user@host").into(),
        RtcpGoodbye::new_with_reason(0x1111_1111, "done").into(),
    ]
}

#[test]
fn compound_survives_encode_and_decode() {
    init_test_logging();
    let packets = typical_compound();
    let bytes = encode_compound(&packets).unwrap();
    let decoded = decode_compound(&bytes).unwrap();
    assert_eq!(decoded, packets);
    validate_compound_order(&decoded).unwrap();

    match &decoded[1] {
        RtcpPacket::SourceDescription(sdes) => {
            assert_eq!(sdes.chunks[0].items[0].item_type, RtcpSdesItemType::CName);
            assert_eq!(sdes.chunks[0].cname(), Some("user@host"));
        }
        other => panic!("expected SDES, got {:?}", other),
    }
}

#[test]
fn unknown_types_between_known_packets_are_skipped() {
    init_test_logging();
    let sr: RtcpPacket = RtcpSenderReport::new(1).into();
    let rr: RtcpPacket = RtcpReceiverReport::new(2).into();

    let mut writer = CompoundWriter::new();
    writer.push(&sr).unwrap();
    // XR (207) with one word of payload
    writer.push_encoded(Bytes::from_static(&[0x80, 207, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef]));
    writer.push(&rr).unwrap();
    let bytes = writer.finish();

    let mut reader = CompoundReader::new(&bytes);
    let packets: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();
    assert_eq!(packets, vec![sr.clone(), rr.clone()]);
    assert_eq!(reader.skipped(), 1);
    assert_eq!(reader.position(), bytes.len());

    let kept: Vec<_> = CompoundReader::with_policy(&bytes, UnknownPacketPolicy::Keep)
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(kept.len(), 3);
    assert_eq!(kept[1].packet_type(), 207);
    assert_eq!(encode_compound(&kept).unwrap(), bytes);
}

#[test]
fn corrupt_tail_keeps_the_good_prefix() {
    init_test_logging();
    let sr: RtcpPacket = RtcpSenderReport::new(7).into();
    let mut bytes = sr.encode().unwrap().to_vec();
    // RR claiming 10 words but carrying only the SSRC
    bytes.extend_from_slice(&[0x80, 201, 0x00, 0x0a, 0, 0, 0, 9]);

    let results: Vec<_> = CompoundReader::new(&bytes).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &sr);
    assert!(matches!(results[1], Err(Error::MalformedPacket(_))));

    // The strict decoder rejects the whole buffer
    assert!(matches!(decode_compound(&bytes), Err(Error::MalformedPacket(_))));
}

#[test]
fn reader_stops_after_first_error() {
    let rr: RtcpPacket = RtcpReceiverReport::new(3).into();
    let mut bytes = vec![0x40, 201, 0x00, 0x01, 0, 0, 0, 1];
    bytes.extend_from_slice(&rr.encode().unwrap());

    let mut reader = CompoundReader::new(&bytes);
    assert!(matches!(reader.next(), Some(Err(Error::MalformedPacket(_)))));
    assert!(reader.next().is_none());
    assert!(reader.next().is_none());
}

#[test]
fn padded_last_packet_is_accepted() {
    let rr: RtcpPacket = RtcpReceiverReport::new(0xabcd).into();
    let mut bytes = rr.encode().unwrap().to_vec();

    // APP packet with P set and four octets of padding
    let app = RtcpApplicationDefined::new(0xabcd, *b"TEST");
    let mut app_bytes = app.encode().unwrap().to_vec();
    app_bytes[0] |= 0x20;
    app_bytes[3] += 1;
    app_bytes.extend_from_slice(&[0, 0, 0, 4]);
    bytes.extend_from_slice(&app_bytes);

    let packets = decode_compound(&bytes).unwrap();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1], RtcpPacket::ApplicationDefined(app));
}

#[test]
fn compound_must_start_with_a_report() {
    let sdes: RtcpPacket = RtcpSourceDescription::with_cname(1, "x").into();
    let rr: RtcpPacket = RtcpReceiverReport::new(1).into();

    assert!(validate_compound_order(&[sdes.clone(), rr.clone()]).is_err());
    assert!(validate_compound_order(&[rr, sdes]).is_ok());
    assert!(validate_compound_order(&[]).is_err());
}
