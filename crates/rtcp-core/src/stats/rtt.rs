use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::time::{compact_ntp_to_duration, NtpTimestamp};

/// EWMA gain for the smoothed RTT (RFC 6298 style)
const ALPHA: f64 = 0.125;

/// EWMA gain for the RTT variation
const BETA: f64 = 0.25;

/// Round-trip time estimator fed by LSR/DLSR pairs of received report blocks
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    /// Most recent sample
    last: Option<Duration>,

    /// Smoothed RTT in seconds
    srtt: f64,

    /// RTT variation in seconds
    rtt_var: f64,

    /// Number of RTT samples processed
    samples: u64,
}

/// RTT in compact NTP units from a report block received at `arrival`
///
/// `arrival - LSR - DLSR` with wrapping arithmetic. There is no sample when
/// the reporter never saw an SR from us (LSR = 0) or when its delay exceeds
/// the elapsed time, which means clocks or fields are off.
pub fn compute_rtt(last_sr: u32, delay_since_last_sr: u32, arrival: SystemTime) -> Option<u32> {
    if last_sr == 0 {
        return None;
    }
    let arrival = NtpTimestamp::from_system_time(arrival).to_compact();
    let elapsed = arrival.wrapping_sub(last_sr);
    // Anything in the upper half is a negative elapsed time
    if elapsed > i32::MAX as u32 || delay_since_last_sr > elapsed {
        return None;
    }
    Some(elapsed - delay_since_last_sr)
}

impl RttEstimator {
    /// Create a new RTT estimator
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a report block's LSR/DLSR and return the new sample if any
    pub fn process_report(&mut self, last_sr: u32, delay_since_last_sr: u32, arrival: SystemTime) -> Option<Duration> {
        let rtt = compact_ntp_to_duration(compute_rtt(last_sr, delay_since_last_sr, arrival)?);
        self.add_sample(rtt);
        debug!("RTT sample {:?}, smoothed {:.3} ms", rtt, self.srtt * 1000.0);
        Some(rtt)
    }

    /// Fold a raw RTT sample into the estimate
    pub fn add_sample(&mut self, rtt: Duration) {
        let rtt_seconds = rtt.as_secs_f64();

        if self.samples == 0 {
            self.srtt = rtt_seconds;
            self.rtt_var = rtt_seconds / 2.0;
        } else {
            let delta = self.srtt - rtt_seconds;
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * delta.abs();
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt_seconds;
        }

        self.samples += 1;
        self.last = Some(rtt);
    }

    /// Most recent raw RTT
    pub fn last_rtt(&self) -> Option<Duration> {
        self.last
    }

    /// Smoothed RTT, once there is at least one sample
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        (self.samples > 0).then(|| Duration::from_secs_f64(self.srtt))
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Mean deviation of samples from the smoothed RTT
    pub fn rtt_variation(&self) -> Option<Duration> {
        (self.samples > 0).then(|| Duration::from_secs_f64(self.rtt_var))
    }

    /// Reset the RTT estimator
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
