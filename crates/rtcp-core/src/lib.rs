//! RTCP Core library
//!
//! This crate provides RTCP packet encoding/decoding (RFC 3550) and the
//! per-session reception statistics that feed outgoing reports.
//!
//! The library is organized into several modules:
//!
//! - `codec`: big-endian field access over byte buffers
//! - `packet`: RTCP packet definitions and compound packet handling
//! - `time`: NTP timestamps and RTP media clocks
//! - `stats`: loss, jitter and RTT tracking per remote SSRC
//! - `config`: statistics engine configuration
//!
//! Nothing here performs I/O or spawns tasks; callers pass arrival times in
//! and send the produced bytes out themselves.

mod error;

pub mod codec;
pub mod config;
pub mod packet;
pub mod stats;
pub mod time;

// Re-export core types
pub use error::Error;

pub use config::{StatsConfig, StatsConfigBuilder};
pub use packet::{
    decode_compound, encode_compound, CompoundReader, CompoundWriter, RtcpApplicationDefined,
    RtcpGoodbye, RtcpPacket, RtcpPacketType, RtcpReceiverReport, RtcpReportBlock, RtcpSenderReport,
    RtcpSourceDescription, UnknownPacketPolicy,
};
pub use stats::{LocalClockState, SessionMetrics, SessionStats, SourceState};
pub use time::{NtpTimestamp, RtpClock};

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Result type for RTCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Error, Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp, SessionStats, StatsConfig,
        StatsConfigBuilder,
    };

    pub use crate::packet::{
        decode_compound, encode_compound, CompoundReader, CompoundWriter, RtcpGoodbye, RtcpPacket,
        RtcpReceiverReport, RtcpReportBlock, RtcpSenderReport, RtcpSourceDescription,
    };

    pub use crate::time::{NtpTimestamp, RtpClock};
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::hex_dump;
    use std::time::{Duration, SystemTime};
    use tracing::debug;

    // Set up a simple test logger
    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_report_exchange_between_two_engines() {
        init_test_logging();

        let alice = SessionStats::new(
            StatsConfigBuilder::new()
                .local_ssrc(0xA11CE)
                .cname("alice@example.com")
                .build()
                .unwrap(),
        )
        .unwrap();
        let bob = SessionStats::new(
            StatsConfigBuilder::new()
                .local_ssrc(0xB0B)
                .cname("bob@example.com")
                .build()
                .unwrap(),
        )
        .unwrap();

        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = RtpClock::new(1000, t0, 8000).unwrap();

        // Alice sends 50 packets, Bob loses every tenth
        for i in 0..50u16 {
            let sent_at = t0 + Duration::from_millis(20) * i as u32;
            alice.on_rtp_packet_sent(160);
            if i % 10 != 9 {
                bob.on_rtp_packet_received(0xA11CE, i, clock.rtp_timestamp_at(sent_at), sent_at, 160);
            }
        }

        let sr_time = t0 + Duration::from_secs(1);
        let sr = alice
            .build_outgoing_compound(&LocalClockState::from_clock(&clock, sr_time))
            .unwrap();
        debug!("Alice SR compound: [{}]", hex_dump(&sr));

        // One-way delay of 40 ms each direction, Bob answers 500 ms later
        assert_eq!(bob.on_compound_received(&sr, sr_time + Duration::from_millis(40)).unwrap(), 2);
        assert_eq!(
            bob.get_session_metrics(0xA11CE).unwrap().cname.as_deref(),
            Some("alice@example.com")
        );

        let rr_time = sr_time + Duration::from_millis(540);
        let rr = bob
            .build_outgoing_compound(&LocalClockState::new(rr_time, 0))
            .unwrap();
        let packets = decode_compound(&rr).unwrap();
        match &packets[0] {
            RtcpPacket::ReceiverReport(rr) => {
                assert_eq!(rr.report_blocks.len(), 1);
                assert_eq!(rr.report_blocks[0].cumulative_lost, 4);
            }
            other => panic!("expected RR, got {:?}", other),
        }

        alice.on_compound_received(&rr, rr_time + Duration::from_millis(40)).unwrap();
        let metrics = alice.get_session_metrics(0xB0B).unwrap();
        let rtt = metrics.round_trip_time.unwrap().as_secs_f64();
        debug!("RTT seen by Alice: {:.4} s", rtt);
        assert!((rtt - 0.080).abs() < 0.001, "rtt = {}", rtt);
        assert_eq!(metrics.remote_cumulative_lost, Some(4));
        assert_eq!(metrics.cname.as_deref(), Some("bob@example.com"));
    }
}
