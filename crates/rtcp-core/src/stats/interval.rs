use std::time::Duration;

use rand::Rng;

/// RTCP interval constants (RFC 3550)
pub const RTCP_MIN_INTERVAL: Duration = Duration::from_millis(5000); // 5 seconds
pub const RTCP_BANDWIDTH_FRACTION: f64 = 0.05; // 5% of session bandwidth
pub const RTCP_SENDER_BANDWIDTH_FRACTION: f64 = 0.25; // 25% of RTCP bandwidth to senders

/// Starting estimate for the average compound packet size in octets
pub const DEFAULT_AVG_RTCP_SIZE: f64 = 100.0;

/// e - 3/2, compensates for the timer reconsideration converging low
const COMPENSATION: f64 = std::f64::consts::E - 1.5;

/// Inputs to the RTCP transmission interval (RFC 3550 Section 6.3.1)
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalParams {
    /// Session members including ourselves
    pub members: u32,
    /// Members that sent RTP recently, including ourselves if we did
    pub senders: u32,
    /// RTCP bandwidth in octets per second
    pub rtcp_bandwidth: f64,
    /// We sent RTP since the second-to-last report
    pub we_sent: bool,
    /// Moving average of compound RTCP packet size in octets
    pub avg_rtcp_size: f64,
    /// No RTCP packet sent yet in this session
    pub initial: bool,
}

impl IntervalParams {
    /// Parameters for a session bandwidth in bits per second, RTCP taking 5% of it
    pub fn for_session_bandwidth(session_bandwidth_bps: u32, members: u32, senders: u32, we_sent: bool) -> Self {
        Self {
            members: members.max(1),
            senders,
            rtcp_bandwidth: session_bandwidth_bps as f64 / 8.0 * RTCP_BANDWIDTH_FRACTION,
            we_sent,
            avg_rtcp_size: DEFAULT_AVG_RTCP_SIZE,
            initial: false,
        }
    }
}

/// Update the average RTCP size with a new packet, gain 1/16
pub fn update_avg_rtcp_size(avg: f64, packet_size: usize) -> f64 {
    avg + (packet_size as f64 - avg) / 16.0
}

/// Randomised interval until the next RTCP transmission (RFC 3550 Appendix A.7)
pub fn compute_rtcp_interval<R: Rng + ?Sized>(params: &IntervalParams, rng: &mut R) -> Duration {
    let mut min_time = RTCP_MIN_INTERVAL.as_secs_f64();
    if params.initial {
        min_time /= 2.0;
    }

    // Senders share a quarter of the RTCP bandwidth while they are few
    let mut n = params.members.max(1) as f64;
    let mut rtcp_bw = params.rtcp_bandwidth;
    if (params.senders as f64) <= params.members as f64 * RTCP_SENDER_BANDWIDTH_FRACTION {
        if params.we_sent {
            rtcp_bw *= RTCP_SENDER_BANDWIDTH_FRACTION;
            n = params.senders.max(1) as f64;
        } else {
            rtcp_bw *= 1.0 - RTCP_SENDER_BANDWIDTH_FRACTION;
            n = (params.members - params.senders.min(params.members)).max(1) as f64;
        }
    }

    let mut t = if rtcp_bw > 0.0 {
        params.avg_rtcp_size * n / rtcp_bw
    } else {
        min_time
    };
    if t < min_time {
        t = min_time;
    }

    t *= rng.gen_range(0.5..1.5);
    t /= COMPENSATION;

    Duration::from_secs_f64(t)
}
