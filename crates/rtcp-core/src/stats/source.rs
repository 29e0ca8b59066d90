use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::packet::{clamp_cumulative_lost, RtcpReportBlock};
use crate::time::duration_to_compact_ntp;
use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

use super::jitter::JitterEstimator;
use super::rtt::RttEstimator;
use super::{SessionMetrics, SourceState};

/// Forward jump accepted as in-order with losses (RFC 3550 Appendix A.1)
pub const MAX_DROPOUT: u16 = 3000;

/// Backward jump still treated as reordering or duplication
pub const MAX_MISORDER: u16 = 100;

const RTP_SEQ_MOD: u32 = 1 << 16;

/// How a sequence number was classified against the stream so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceUpdate {
    /// First packet of the stream
    First,
    /// At or ahead of the highest sequence seen
    InOrder,
    /// Crossed 65535 -> 0, a new cycle started
    Wrapped,
    /// Same sequence number as the highest seen
    Duplicate,
    /// Late packet within the misorder window
    Reordered,
    /// Large jump, held back until confirmed by the next packet
    Jumped,
    /// Second packet after a large jump; the stream restarted
    Restarted,
}

/// Report from a remote receiver about our own stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteReception {
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
    pub highest_seq: u32,
    pub jitter: u32,
}

/// Reception statistics and remote report state for one SSRC
#[derive(Debug, Clone)]
pub struct SourceRecord {
    ssrc: RtpSsrc,
    state: SourceState,
    last_activity: SystemTime,

    has_rtp: bool,
    base_seq: u32,
    max_seq: RtpSequenceNumber,
    /// Shifted count of sequence number cycles
    cycles: u32,
    bad_seq: u32,
    received: u64,
    expected_prior: u64,
    received_prior: u64,
    octets_received: u64,

    jitter: JitterEstimator,

    /// Compact NTP of the last SR from this source and when it arrived
    last_sr: Option<(u32, SystemTime)>,

    cname: Option<String>,
    remote_reception: Option<RemoteReception>,
    rtt: RttEstimator,
}

impl SourceRecord {
    pub fn new(ssrc: RtpSsrc, clock_rate: u32, now: SystemTime) -> Self {
        Self {
            ssrc,
            state: SourceState::Active,
            last_activity: now,
            has_rtp: false,
            base_seq: 0,
            max_seq: 0,
            cycles: 0,
            bad_seq: RTP_SEQ_MOD + 1,
            received: 0,
            expected_prior: 0,
            received_prior: 0,
            octets_received: 0,
            jitter: JitterEstimator::new(clock_rate),
            last_sr: None,
            cname: None,
            remote_reception: None,
            rtt: RttEstimator::new(),
        }
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Whether RTP from this source has been seen, making it reportable
    pub fn has_rtp(&self) -> bool {
        self.has_rtp
    }

    pub fn last_activity(&self) -> SystemTime {
        self.last_activity
    }

    fn touch(&mut self, now: SystemTime) {
        if now > self.last_activity {
            self.last_activity = now;
        }
        if self.state == SourceState::Inactive {
            debug!("source {:08x} active again", self.ssrc);
        }
        self.state = SourceState::Active;
    }

    /// Account for one RTP packet
    pub fn on_rtp_packet(
        &mut self,
        seq: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        arrival: SystemTime,
        payload_size: usize,
    ) -> SequenceUpdate {
        self.touch(arrival);

        let update = self.update_seq(seq);
        if update == SequenceUpdate::Jumped {
            return update;
        }

        self.received += 1;
        self.octets_received += payload_size as u64;

        // Every accepted packet feeds jitter in arrival order, late ones included
        self.jitter.update(timestamp, arrival);

        update
    }

    fn init_seq(&mut self, seq: RtpSequenceNumber) {
        self.base_seq = seq as u32;
        self.max_seq = seq;
        self.bad_seq = RTP_SEQ_MOD + 1;
        self.cycles = 0;
        self.received = 0;
        self.received_prior = 0;
        self.expected_prior = 0;
    }

    fn update_seq(&mut self, seq: RtpSequenceNumber) -> SequenceUpdate {
        if !self.has_rtp {
            self.has_rtp = true;
            self.init_seq(seq);
            debug!("source {:08x} first RTP packet, seq {}", self.ssrc, seq);
            return SequenceUpdate::First;
        }

        let udelta = seq.wrapping_sub(self.max_seq);

        if udelta == 0 {
            SequenceUpdate::Duplicate
        } else if udelta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles = self.cycles.wrapping_add(RTP_SEQ_MOD);
                self.max_seq = seq;
                debug!("source {:08x} sequence wrapped, cycles {}", self.ssrc, self.cycles >> 16);
                return SequenceUpdate::Wrapped;
            }
            self.max_seq = seq;
            SequenceUpdate::InOrder
        } else if udelta as u32 <= RTP_SEQ_MOD - MAX_MISORDER as u32 {
            if seq as u32 == self.bad_seq {
                // Two sequential packets after a jump: the sender restarted
                warn!(
                    "source {:08x} sequence restarted at {} after a jump",
                    self.ssrc, seq
                );
                self.init_seq(seq);
                self.jitter.reset();
                SequenceUpdate::Restarted
            } else {
                self.bad_seq = (seq as u32 + 1) & (RTP_SEQ_MOD - 1);
                debug!("source {:08x} large sequence jump to {}", self.ssrc, seq);
                SequenceUpdate::Jumped
            }
        } else {
            SequenceUpdate::Reordered
        }
    }

    /// Highest sequence number including the cycle count
    pub fn extended_highest_seq(&self) -> u32 {
        self.cycles.wrapping_add(self.max_seq as u32)
    }

    pub fn expected(&self) -> u64 {
        if !self.has_rtp {
            return 0;
        }
        (self.extended_highest_seq() as u64 + 1).saturating_sub(self.base_seq as u64)
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Expected minus received; negative when duplicates outnumber losses
    pub fn cumulative_lost(&self) -> i64 {
        self.expected() as i64 - self.received as i64
    }

    /// Fraction lost since the last report block, in 1/256 units
    pub fn interval_fraction_lost(&self) -> u8 {
        fraction_lost(
            self.expected() as i64 - self.expected_prior as i64,
            self.received as i64 - self.received_prior as i64,
        )
    }

    pub fn cname(&self) -> Option<&str> {
        self.cname.as_deref()
    }

    pub fn set_cname(&mut self, cname: impl Into<String>, now: SystemTime) {
        let cname = cname.into();
        if self.cname.as_deref() != Some(cname.as_str()) {
            debug!("source {:08x} CNAME {}", self.ssrc, cname);
        }
        self.cname = Some(cname);
        self.touch(now);
    }

    /// Remember the SR so our next report block can echo LSR/DLSR
    pub fn on_sender_report(&mut self, compact_ntp: u32, arrival: SystemTime) {
        self.last_sr = Some((compact_ntp, arrival));
        self.touch(arrival);
    }

    /// Any other RTCP packet from this source
    pub fn on_rtcp(&mut self, arrival: SystemTime) {
        self.touch(arrival);
    }

    /// A report block this source sent about our stream
    pub fn on_report_about_local(&mut self, block: &RtcpReportBlock, arrival: SystemTime) -> Option<Duration> {
        self.remote_reception = Some(RemoteReception {
            fraction_lost: block.fraction_lost,
            cumulative_lost: block.cumulative_lost,
            highest_seq: block.highest_seq,
            jitter: block.jitter,
        });
        self.rtt.process_report(block.last_sr, block.delay_since_last_sr, arrival)
    }

    pub fn remote_reception(&self) -> Option<RemoteReception> {
        self.remote_reception
    }

    pub fn mark_inactive(&mut self) {
        if self.state == SourceState::Active {
            debug!("source {:08x} inactive", self.ssrc);
            self.state = SourceState::Inactive;
        }
    }

    /// Produce a report block and start a new reporting interval
    pub fn build_report_block(&mut self, now: SystemTime) -> RtcpReportBlock {
        let expected = self.expected();
        let expected_interval = expected as i64 - self.expected_prior as i64;
        let received_interval = self.received as i64 - self.received_prior as i64;
        self.expected_prior = expected;
        self.received_prior = self.received;

        let (last_sr, delay_since_last_sr) = match self.last_sr {
            Some((lsr, received_at)) => {
                let delay = now.duration_since(received_at).unwrap_or(Duration::ZERO);
                (lsr, duration_to_compact_ntp(delay))
            }
            None => (0, 0),
        };

        RtcpReportBlock {
            ssrc: self.ssrc,
            fraction_lost: fraction_lost(expected_interval, received_interval),
            cumulative_lost: clamp_cumulative_lost(self.cumulative_lost()),
            highest_seq: self.extended_highest_seq(),
            jitter: self.jitter.jitter_rtp_units(),
            last_sr,
            delay_since_last_sr,
        }
    }

    /// Snapshot for callers outside the engine
    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            ssrc: self.ssrc,
            state: self.state,
            jitter: self.jitter.jitter(),
            jitter_seconds: self.jitter.jitter_seconds(),
            max_jitter: self.jitter.max_jitter(),
            fraction_lost: self.interval_fraction_lost() as f64 / 256.0,
            cumulative_lost: self.cumulative_lost(),
            expected: self.expected(),
            received: self.received,
            octets_received: self.octets_received,
            extended_highest_seq: self.extended_highest_seq(),
            round_trip_time: self.rtt.last_rtt(),
            smoothed_round_trip_time: self.rtt.smoothed_rtt(),
            round_trip_time_variation: self.rtt.rtt_variation(),
            remote_fraction_lost: self
                .remote_reception
                .map(|report| report.fraction_lost as f64 / 256.0),
            remote_cumulative_lost: self.remote_reception.map(|report| report.cumulative_lost),
            remote_jitter: self.remote_reception.map(|report| report.jitter),
            cname: self.cname.clone(),
        }
    }
}

/// round(256 * lost / expected) clamped to a byte; 0 without loss
pub fn fraction_lost(expected_interval: i64, received_interval: i64) -> u8 {
    let lost_interval = expected_interval - received_interval;
    if expected_interval <= 0 || lost_interval <= 0 {
        return 0;
    }
    let fraction = (256.0 * lost_interval as f64 / expected_interval as f64).round();
    fraction.min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn feed(record: &mut SourceRecord, seqs: &[u16]) -> Vec<SequenceUpdate> {
        seqs.iter()
            .map(|&seq| {
                let offset = Duration::from_millis(20) * seq as u32;
                record.on_rtp_packet(seq, seq as u32 * 160, start() + offset, 160)
            })
            .collect()
    }

    #[test]
    fn test_sequence_wrap_extends_highest() {
        let mut record = SourceRecord::new(1, 8000, start());
        let mut highest = Vec::new();
        for seq in [65534u16, 65535, 0, 1] {
            record.on_rtp_packet(seq, 0, start(), 0);
            highest.push(record.extended_highest_seq());
        }
        assert_eq!(highest, vec![65534, 65535, 65536, 65537]);
        assert_eq!(record.expected(), 4);
        assert_eq!(record.cumulative_lost(), 0);
    }

    #[test]
    fn test_loss_accounting() {
        let mut record = SourceRecord::new(1, 8000, start());
        feed(&mut record, &[1, 2, 4, 5, 6, 8, 9, 10]);

        assert_eq!(record.expected(), 10);
        assert_eq!(record.received(), 8);
        assert_eq!(record.cumulative_lost(), 2);
        assert_eq!(record.interval_fraction_lost(), 51);

        let block = record.build_report_block(start());
        assert_eq!(block.fraction_lost, 51);
        assert_eq!(block.cumulative_lost, 2);
        assert_eq!(block.highest_seq, 10);

        // Next interval starts clean
        feed(&mut record, &[11, 12]);
        let block = record.build_report_block(start());
        assert_eq!(block.fraction_lost, 0);
        assert_eq!(block.cumulative_lost, 2);
    }

    #[test]
    fn test_duplicates_make_cumulative_lost_negative() {
        let mut record = SourceRecord::new(1, 8000, start());
        let updates = feed(&mut record, &[1, 2, 3, 3, 3]);
        assert_eq!(updates[3], SequenceUpdate::Duplicate);
        assert_eq!(record.cumulative_lost(), -2);

        let block = record.build_report_block(start());
        assert_eq!(block.cumulative_lost, -2);
        assert_eq!(block.fraction_lost, 0);
    }

    #[test]
    fn test_reordered_packet_fills_gap() {
        let mut record = SourceRecord::new(1, 8000, start());
        let updates = feed(&mut record, &[10, 12, 11, 13]);
        assert_eq!(
            updates,
            vec![
                SequenceUpdate::First,
                SequenceUpdate::InOrder,
                SequenceUpdate::Reordered,
                SequenceUpdate::InOrder
            ]
        );
        assert_eq!(record.extended_highest_seq(), 13);
        assert_eq!(record.cumulative_lost(), 0);
    }

    #[test]
    fn test_reordered_packet_still_feeds_jitter() {
        let mut record = SourceRecord::new(1, 8000, start());
        for (i, seq) in [1u16, 2, 4, 3, 5].into_iter().enumerate() {
            let arrival = start() + Duration::from_millis(20) * i as u32;
            record.on_rtp_packet(seq, seq as u32 * 160, arrival, 160);
        }

        // |D| = 0, 160, 320, 160 folded into J += (|D| - J) / 16
        let mut expected = 0.0f64;
        for d in [0.0, 160.0, 320.0, 160.0] {
            expected += (d - expected) / 16.0;
        }
        assert!((expected - 37.5390625).abs() < 1e-9);

        let metrics = record.metrics();
        assert!((metrics.jitter - expected).abs() < 1e-6, "jitter {}", metrics.jitter);
        assert_eq!(metrics.max_jitter, metrics.jitter);
        assert_eq!(record.build_report_block(start()).jitter, 37);
    }

    #[test]
    fn test_large_jump_needs_confirmation() {
        let mut record = SourceRecord::new(1, 8000, start());
        feed(&mut record, &[100, 101]);

        assert_eq!(feed(&mut record, &[20_000]), vec![SequenceUpdate::Jumped]);
        assert_eq!(record.extended_highest_seq(), 101);
        assert_eq!(record.received(), 2);

        assert_eq!(feed(&mut record, &[20_001]), vec![SequenceUpdate::Restarted]);
        assert_eq!(record.extended_highest_seq(), 20_001);
        assert_eq!(record.expected(), 1);
        assert_eq!(record.received(), 1);
    }

    #[test]
    fn test_fraction_lost_rounding_and_clamp() {
        assert_eq!(fraction_lost(10, 8), 51);
        assert_eq!(fraction_lost(3, 2), 85);
        assert_eq!(fraction_lost(1000, 0), 255);
        assert_eq!(fraction_lost(0, 0), 0);
        assert_eq!(fraction_lost(5, 7), 0);
    }

    #[test]
    fn test_lsr_and_dlsr_echo() {
        let mut record = SourceRecord::new(1, 8000, start());
        feed(&mut record, &[1]);
        record.on_sender_report(0x1234_8000, start());

        let block = record.build_report_block(start() + Duration::from_millis(1500));
        assert_eq!(block.last_sr, 0x1234_8000);
        assert_eq!(block.delay_since_last_sr, 0x0001_8000);
    }

    #[test]
    fn test_inactive_then_active_again() {
        let mut record = SourceRecord::new(1, 8000, start());
        record.mark_inactive();
        assert_eq!(record.state(), SourceState::Inactive);
        record.on_rtcp(start() + Duration::from_secs(1));
        assert_eq!(record.state(), SourceState::Active);
        assert_eq!(record.last_activity(), start() + Duration::from_secs(1));
    }
}
