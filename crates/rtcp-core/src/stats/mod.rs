//! RTCP Statistics Module
//!
//! This module provides the per-session statistics engine defined in RFC 3550:
//! packet loss and extended sequence tracking, interarrival jitter, round-trip
//! time from received report blocks, and generation of outgoing SR/RR/SDES/BYE.
//!
//! One [`SessionStats`] exists per media session. It is `Send + Sync` and every
//! operation takes `&self`, so the receive path, the report timer and metrics
//! readers can share it behind an `Arc`.

pub mod interval;
pub mod jitter;
pub mod rtt;
pub mod source;

pub use interval::{
    compute_rtcp_interval, IntervalParams, RTCP_BANDWIDTH_FRACTION, RTCP_MIN_INTERVAL,
    RTCP_SENDER_BANDWIDTH_FRACTION,
};
pub use jitter::JitterEstimator;
pub use rtt::RttEstimator;
pub use source::{SequenceUpdate, SourceRecord, MAX_DROPOUT, MAX_MISORDER};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{StatsConfig, CLOSED_TOMBSTONE_TIMEOUT};
use crate::packet::{
    decode_compound, CompoundWriter, RtcpGoodbye, RtcpPacket, RtcpReceiverReport, RtcpReportBlock,
    RtcpSenderReport, RtcpSourceDescription,
};
use crate::time::{NtpTimestamp, RtpClock};
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

use interval::{update_avg_rtcp_size, DEFAULT_AVG_RTCP_SIZE};

/// Lifecycle of a remote SSRC within the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceState {
    /// Never seen, or released after a timeout
    Unknown,
    /// Sending RTP or RTCP recently
    Active,
    /// Silent for longer than the inactivity timeout
    Inactive,
    /// Left with BYE or torn down explicitly
    Closed,
}

/// Snapshot of the statistics kept for one remote SSRC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub ssrc: RtpSsrc,
    pub state: SourceState,
    /// Interarrival jitter in RTP timestamp units
    pub jitter: f64,
    pub jitter_seconds: f64,
    /// Highest jitter estimate seen since the stream (re)started
    pub max_jitter: f64,
    /// Fraction lost in the current reporting interval, 0.0 to 1.0
    pub fraction_lost: f64,
    /// Expected minus received over the whole session
    pub cumulative_lost: i64,
    pub expected: u64,
    pub received: u64,
    pub octets_received: u64,
    pub extended_highest_seq: u32,
    /// Latest RTT sample derived from this source's reports about us
    pub round_trip_time: Option<Duration>,
    pub smoothed_round_trip_time: Option<Duration>,
    pub round_trip_time_variation: Option<Duration>,
    /// This source's view of our loss, 0.0 to 1.0
    pub remote_fraction_lost: Option<f64>,
    pub remote_cumulative_lost: Option<i32>,
    pub remote_jitter: Option<u32>,
    pub cname: Option<String>,
}

/// Local clocks sampled at the instant an SR is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClockState {
    pub wall_clock: SystemTime,
    pub rtp_timestamp: RtpTimestamp,
}

impl LocalClockState {
    pub fn new(wall_clock: SystemTime, rtp_timestamp: RtpTimestamp) -> Self {
        Self {
            wall_clock,
            rtp_timestamp,
        }
    }

    /// Sample `clock` at `now`
    pub fn from_clock(clock: &RtpClock, now: SystemTime) -> Self {
        Self::new(now, clock.rtp_timestamp_at(now))
    }
}

#[derive(Debug, Clone)]
enum SourceEntry {
    Live(Arc<Mutex<SourceRecord>>),
    /// Tombstone kept so late packets are recognised as a restart
    Closed { since: SystemTime },
}

#[derive(Debug, Default)]
struct SenderState {
    packets_sent: u32,
    octets_sent: u32,
    sent_since_last_report: bool,
    reports_sent: u64,
    avg_rtcp_size: f64,
}

/// RTCP statistics engine for one media session
#[derive(Debug)]
pub struct SessionStats {
    config: StatsConfig,
    sources: RwLock<HashMap<RtpSsrc, SourceEntry>>,
    sender: Mutex<SenderState>,
}

impl SessionStats {
    /// Create an engine, rejecting invalid configuration
    pub fn new(config: StatsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sources: RwLock::new(HashMap::new()),
            sender: Mutex::new(SenderState {
                avg_rtcp_size: DEFAULT_AVG_RTCP_SIZE,
                ..SenderState::default()
            }),
        })
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub fn local_ssrc(&self) -> RtpSsrc {
        self.config.local_ssrc
    }

    /// Live record for `ssrc`, creating it (or restarting a closed one)
    fn record(&self, ssrc: RtpSsrc, now: SystemTime) -> Arc<Mutex<SourceRecord>> {
        {
            let sources = self.sources.read();
            if let Some(SourceEntry::Live(record)) = sources.get(&ssrc) {
                return Arc::clone(record);
            }
        }

        let mut sources = self.sources.write();
        match sources.get(&ssrc) {
            Some(SourceEntry::Live(record)) => Arc::clone(record),
            previous => {
                if matches!(previous, Some(SourceEntry::Closed { .. })) {
                    debug!("closed source {:08x} seen again, starting a fresh record", ssrc);
                } else {
                    debug!("new source {:08x}", ssrc);
                }
                let record = Arc::new(Mutex::new(SourceRecord::new(ssrc, self.config.clock_rate, now)));
                sources.insert(ssrc, SourceEntry::Live(Arc::clone(&record)));
                record
            }
        }
    }

    fn existing_record(&self, ssrc: RtpSsrc) -> Option<Arc<Mutex<SourceRecord>>> {
        match self.sources.read().get(&ssrc) {
            Some(SourceEntry::Live(record)) => Some(Arc::clone(record)),
            _ => None,
        }
    }

    fn live_records(&self) -> Vec<Arc<Mutex<SourceRecord>>> {
        self.sources
            .read()
            .values()
            .filter_map(|entry| match entry {
                SourceEntry::Live(record) => Some(Arc::clone(record)),
                SourceEntry::Closed { .. } => None,
            })
            .collect()
    }

    /// Account for a received RTP packet
    pub fn on_rtp_packet_received(
        &self,
        ssrc: RtpSsrc,
        seq: RtpSequenceNumber,
        rtp_timestamp: RtpTimestamp,
        arrival: SystemTime,
        payload_size: usize,
    ) -> SequenceUpdate {
        let record = self.record(ssrc, arrival);
        let update = record.lock().on_rtp_packet(seq, rtp_timestamp, arrival, payload_size);
        trace!("RTP from {:08x} seq {}: {:?}", ssrc, seq, update);
        update
    }

    /// Account for an RTP packet we sent
    pub fn on_rtp_packet_sent(&self, payload_size: usize) {
        let mut sender = self.sender.lock();
        sender.packets_sent = sender.packets_sent.wrapping_add(1);
        sender.octets_sent = sender.octets_sent.wrapping_add(payload_size as u32);
        sender.sent_since_last_report = true;
    }

    /// Packets and payload octets sent so far, both wrapping at 2^32
    pub fn sent_counts(&self) -> (u32, u32) {
        let sender = self.sender.lock();
        (sender.packets_sent, sender.octets_sent)
    }

    /// Apply one received RTCP packet
    pub fn on_rtcp_report_received(&self, packet: &RtcpPacket, arrival: SystemTime) {
        match packet {
            RtcpPacket::SenderReport(sr) => {
                let record = self.record(sr.ssrc, arrival);
                record.lock().on_sender_report(sr.ntp_timestamp.to_compact(), arrival);
                trace!("SR from {:08x} with {} blocks", sr.ssrc, sr.report_blocks.len());
                self.process_report_blocks(sr.ssrc, &sr.report_blocks, arrival);
            }
            RtcpPacket::ReceiverReport(rr) => {
                self.record(rr.ssrc, arrival).lock().on_rtcp(arrival);
                trace!("RR from {:08x} with {} blocks", rr.ssrc, rr.report_blocks.len());
                self.process_report_blocks(rr.ssrc, &rr.report_blocks, arrival);
            }
            RtcpPacket::SourceDescription(sdes) => {
                for chunk in &sdes.chunks {
                    let record = self.record(chunk.ssrc, arrival);
                    let mut record = record.lock();
                    match chunk.cname() {
                        Some(cname) => record.set_cname(cname, arrival),
                        None => record.on_rtcp(arrival),
                    }
                }
            }
            RtcpPacket::Goodbye(bye) => {
                for &ssrc in &bye.sources {
                    if ssrc == self.config.local_ssrc {
                        warn!("BYE names our own SSRC {:08x}, ignoring it", ssrc);
                        continue;
                    }
                    debug!(
                        "BYE from {:08x}: {}",
                        ssrc,
                        bye.reason.as_deref().unwrap_or("no reason")
                    );
                    self.close_source_at(ssrc, arrival);
                }
            }
            RtcpPacket::ApplicationDefined(app) => {
                trace!("ignoring APP packet {:?} from {:08x}", app.name_str(), app.ssrc);
            }
            RtcpPacket::Unknown { packet_type, .. } => {
                trace!("ignoring RTCP packet type {}", packet_type);
            }
        }
    }

    fn process_report_blocks(&self, reporter: RtpSsrc, blocks: &[RtcpReportBlock], arrival: SystemTime) {
        for block in blocks.iter().filter(|block| block.ssrc == self.config.local_ssrc) {
            let record = self.record(reporter, arrival);
            let rtt = record.lock().on_report_about_local(block, arrival);
            if let Some(rtt) = rtt {
                trace!("RTT to {:08x}: {:?}", reporter, rtt);
            }
        }
    }

    /// Decode a compound packet and apply every sub-packet
    ///
    /// A malformed compound is dropped whole and nothing is applied.
    /// Returns the number of packets applied.
    pub fn on_compound_received(&self, buf: &[u8], arrival: SystemTime) -> Result<usize> {
        let packets = decode_compound(buf).map_err(|err| {
            warn!("dropping malformed RTCP compound of {} bytes: {}", buf.len(), err);
            err
        })?;

        {
            let mut sender = self.sender.lock();
            sender.avg_rtcp_size = update_avg_rtcp_size(sender.avg_rtcp_size, buf.len());
        }

        for packet in &packets {
            self.on_rtcp_report_received(packet, arrival);
        }
        Ok(packets.len())
    }

    /// Report blocks for all active sources, as of now
    pub fn build_outgoing_report_blocks(&self) -> Vec<RtcpReportBlock> {
        self.build_outgoing_report_blocks_at(SystemTime::now())
    }

    /// Report blocks for active sources that sent RTP, ordered by SSRC
    ///
    /// Starts a new reporting interval for each reported source.
    pub fn build_outgoing_report_blocks_at(&self, now: SystemTime) -> Vec<RtcpReportBlock> {
        let mut records: Vec<_> = self
            .live_records()
            .into_iter()
            .map(|record| {
                let ssrc = record.lock().ssrc();
                (ssrc, record)
            })
            .collect();
        records.sort_unstable_by_key(|(ssrc, _)| *ssrc);

        let mut blocks = Vec::with_capacity(records.len().min(self.config.max_report_blocks));
        for (_, record) in records {
            if blocks.len() >= self.config.max_report_blocks {
                break;
            }
            let mut record = record.lock();
            if record.state() != SourceState::Active || !record.has_rtp() {
                continue;
            }
            blocks.push(record.build_report_block(now));
        }
        blocks
    }

    /// Sender report with our counters and report blocks
    pub fn build_outgoing_sender_report(&self, local_ssrc: RtpSsrc, clock: &LocalClockState) -> RtcpSenderReport {
        let report_blocks = self.build_outgoing_report_blocks_at(clock.wall_clock);

        let mut sender = self.sender.lock();
        sender.sent_since_last_report = false;
        sender.reports_sent += 1;

        RtcpSenderReport {
            ssrc: local_ssrc,
            ntp_timestamp: NtpTimestamp::from_system_time(clock.wall_clock),
            rtp_timestamp: clock.rtp_timestamp,
            sender_packet_count: sender.packets_sent,
            sender_octet_count: sender.octets_sent,
            report_blocks,
        }
    }

    /// Receiver report for the local SSRC, as of now
    pub fn build_outgoing_receiver_report(&self) -> RtcpReceiverReport {
        self.build_outgoing_receiver_report_at(SystemTime::now())
    }

    pub fn build_outgoing_receiver_report_at(&self, now: SystemTime) -> RtcpReceiverReport {
        let report_blocks = self.build_outgoing_report_blocks_at(now);
        self.sender.lock().reports_sent += 1;
        RtcpReceiverReport {
            ssrc: self.config.local_ssrc,
            report_blocks,
        }
    }

    /// Encoded compound: SR if we sent RTP since the last report, else RR, then SDES CNAME
    pub fn build_outgoing_compound(&self, clock: &LocalClockState) -> Result<Bytes> {
        let we_sent = self.sender.lock().sent_since_last_report;

        let report = if we_sent {
            RtcpPacket::SenderReport(self.build_outgoing_sender_report(self.config.local_ssrc, clock))
        } else {
            RtcpPacket::ReceiverReport(self.build_outgoing_receiver_report_at(clock.wall_clock))
        };

        let mut writer = CompoundWriter::new();
        writer.push(&report)?;
        if !self.config.cname.is_empty() {
            let sdes = RtcpSourceDescription::with_cname(self.config.local_ssrc, self.config.cname.clone());
            writer.push(&RtcpPacket::SourceDescription(sdes))?;
        }

        let compound = writer.finish();
        let mut sender = self.sender.lock();
        sender.avg_rtcp_size = update_avg_rtcp_size(sender.avg_rtcp_size, compound.len());
        Ok(compound)
    }

    /// BYE for the local SSRC
    pub fn build_bye(&self, reason: Option<&str>) -> RtcpGoodbye {
        let mut bye = RtcpGoodbye::new_for_source(self.config.local_ssrc);
        if let Some(reason) = reason {
            bye.set_reason(reason);
        }
        bye
    }

    /// Parameters for [`compute_rtcp_interval`] from the current membership
    pub fn interval_params(&self, session_bandwidth_bps: u32) -> IntervalParams {
        let records = self.live_records();
        let mut members = 1u32;
        let mut senders = 0u32;
        for record in &records {
            let record = record.lock();
            if record.state() == SourceState::Active {
                members += 1;
                if record.has_rtp() {
                    senders += 1;
                }
            }
        }

        let sender = self.sender.lock();
        if sender.sent_since_last_report {
            senders += 1;
        }

        let mut params =
            IntervalParams::for_session_bandwidth(session_bandwidth_bps, members, senders, sender.sent_since_last_report);
        params.avg_rtcp_size = sender.avg_rtcp_size;
        params.initial = sender.reports_sent == 0;
        params
    }

    /// Statistics snapshot for a remote SSRC
    pub fn get_session_metrics(&self, ssrc: RtpSsrc) -> Option<SessionMetrics> {
        self.existing_record(ssrc).map(|record| {
            let record = record.lock();
            record.metrics()
        })
    }

    pub fn source_state(&self, ssrc: RtpSsrc) -> SourceState {
        let record = match self.sources.read().get(&ssrc) {
            Some(SourceEntry::Live(record)) => Arc::clone(record),
            Some(SourceEntry::Closed { .. }) => return SourceState::Closed,
            None => return SourceState::Unknown,
        };
        let state = record.lock().state();
        state
    }

    /// SSRCs currently in the Active state, ascending
    pub fn active_sources(&self) -> Vec<RtpSsrc> {
        let mut active: Vec<RtpSsrc> = self
            .live_records()
            .iter()
            .filter_map(|record| {
                let record = record.lock();
                (record.state() == SourceState::Active).then(|| record.ssrc())
            })
            .collect();
        active.sort_unstable();
        active
    }

    /// Mark silent sources inactive and release long-silent ones
    ///
    /// Closed SSRCs are forgotten once [`CLOSED_TOMBSTONE_TIMEOUT`] has passed,
    /// whatever `removal_timeout` says. Returns the SSRCs that became inactive
    /// during this call.
    pub fn check_timeouts(&self, now: SystemTime) -> Vec<RtpSsrc> {
        let mut newly_inactive = Vec::new();
        let mut expired = Vec::new();

        for record in self.live_records() {
            let mut record = record.lock();
            let silent_for = now.duration_since(record.last_activity()).unwrap_or(Duration::ZERO);

            if record.state() == SourceState::Active && silent_for >= self.config.inactivity_timeout {
                record.mark_inactive();
                newly_inactive.push(record.ssrc());
            }

            if let Some(removal) = self.config.removal_timeout {
                if record.state() == SourceState::Inactive && silent_for >= removal {
                    debug!("releasing source {:08x} after {:?} of silence", record.ssrc(), silent_for);
                    expired.push(record.ssrc());
                }
            }
        }

        let mut sources = self.sources.write();
        for ssrc in &expired {
            sources.remove(ssrc);
        }
        let before = sources.len();
        sources.retain(|_, entry| match entry {
            SourceEntry::Closed { since } => {
                now.duration_since(*since).unwrap_or(Duration::ZERO) < CLOSED_TOMBSTONE_TIMEOUT
            }
            SourceEntry::Live(_) => true,
        });
        if sources.len() < before {
            trace!("purged {} closed sources", before - sources.len());
        }
        drop(sources);

        newly_inactive.sort_unstable();
        newly_inactive
    }

    /// Tear down a source explicitly; returns whether it was live
    pub fn close_source(&self, ssrc: RtpSsrc) -> bool {
        self.close_source_at(ssrc, SystemTime::now())
    }

    fn close_source_at(&self, ssrc: RtpSsrc, now: SystemTime) -> bool {
        let previous = self.sources.write().insert(ssrc, SourceEntry::Closed { since: now });
        let was_live = matches!(previous, Some(SourceEntry::Live(_)));
        if was_live {
            debug!("source {:08x} closed", ssrc);
        }
        was_live
    }

    /// End the session: every known source is closed
    pub fn close_all(&self) {
        let now = SystemTime::now();
        let mut sources = self.sources.write();
        for entry in sources.values_mut() {
            if let SourceEntry::Live(_) = entry {
                *entry = SourceEntry::Closed { since: now };
            }
        }
        debug!("closed all {} sources", sources.len());
    }
}
