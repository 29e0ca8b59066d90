use std::time::SystemTime;

use crate::time::signed_seconds_between;
use crate::RtpTimestamp;

/// Jitter estimator implementing the RFC 3550 interarrival jitter algorithm
///
/// Works in RTP timestamp units so the value can go straight into a report
/// block (Section 6.4.1, Appendix A.8).
#[derive(Debug, Clone)]
pub struct JitterEstimator {
    /// Current jitter value in RTP timestamp units
    jitter: f64,

    /// Arrival time of the previous packet
    last_arrival: Option<SystemTime>,

    /// RTP timestamp of the previous packet
    last_timestamp: Option<RtpTimestamp>,

    /// Clock rate for timestamp conversion
    clock_rate: u32,

    /// Maximum jitter seen
    max_jitter: f64,

    /// Number of transit differences folded in
    samples: u64,
}

impl JitterEstimator {
    /// Create a new jitter estimator
    pub fn new(clock_rate: u32) -> Self {
        Self {
            jitter: 0.0,
            last_arrival: None,
            last_timestamp: None,
            clock_rate,
            max_jitter: 0.0,
            samples: 0,
        }
    }

    /// Update the jitter estimate with a new packet
    pub fn update(&mut self, timestamp: RtpTimestamp, arrival: SystemTime) -> f64 {
        if let (Some(last_arrival), Some(last_timestamp)) = (self.last_arrival, self.last_timestamp) {
            // D(i-1,i) = (Rj - Ri) - (Sj - Si), everything in RTP units
            let arrival_delta = signed_seconds_between(last_arrival, arrival) * self.clock_rate as f64;
            let ts_delta = timestamp.wrapping_sub(last_timestamp) as i32 as f64;
            let transit_delta = arrival_delta - ts_delta;

            // J(i) = J(i-1) + (|D(i-1,i)| - J(i-1))/16
            self.jitter += (transit_delta.abs() - self.jitter) / 16.0;

            self.max_jitter = self.max_jitter.max(self.jitter);
            self.samples += 1;
        }

        self.last_arrival = Some(arrival);
        self.last_timestamp = Some(timestamp);

        self.jitter
    }

    /// Current jitter in RTP timestamp units
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Jitter as carried in a report block
    pub fn jitter_rtp_units(&self) -> u32 {
        self.jitter as u32
    }

    /// Current jitter in seconds
    pub fn jitter_seconds(&self) -> f64 {
        if self.clock_rate == 0 {
            return 0.0;
        }
        self.jitter / self.clock_rate as f64
    }

    /// Maximum jitter seen in RTP timestamp units
    pub fn max_jitter(&self) -> f64 {
        self.max_jitter
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Reset the jitter estimator
    pub fn reset(&mut self) {
        self.jitter = 0.0;
        self.last_arrival = None;
        self.last_timestamp = None;
        self.max_jitter = 0.0;
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PACKET_INTERVAL: Duration = Duration::from_millis(20);
    const SAMPLES_PER_PACKET: u32 = 160;

    #[test]
    fn test_perfect_timing_has_no_jitter() {
        let mut estimator = JitterEstimator::new(8000);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        for i in 0..50u32 {
            estimator.update(i * SAMPLES_PER_PACKET, start + PACKET_INTERVAL * i);
        }

        assert!(estimator.jitter() < 1e-6);
        assert_eq!(estimator.samples(), 49);
    }

    #[test]
    fn test_recurrence_converges_to_constant_deviation() {
        // Every packet deviates from its nominal spacing by exactly 8 ticks (1 ms)
        let mut estimator = JitterEstimator::new(8000);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let mut expected = 0.0f64;
        for i in 0..200u32 {
            let wobble = if i % 2 == 0 { Duration::ZERO } else { Duration::from_millis(1) };
            let jitter = estimator.update(i * SAMPLES_PER_PACKET, start + PACKET_INTERVAL * i + wobble);
            if i > 0 {
                expected += (8.0 - expected) / 16.0;
            }
            assert!((jitter - expected).abs() < 1e-6, "step {}: {} vs {}", i, jitter, expected);
        }

        assert!((estimator.jitter() - 8.0).abs() < 0.01);
        assert_eq!(estimator.jitter_rtp_units(), 7);
        assert!((estimator.jitter_seconds() - 0.001).abs() < 1e-5);
    }

    #[test]
    fn test_timestamp_wraparound() {
        let mut estimator = JitterEstimator::new(8000);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        estimator.update(u32::MAX - 79, start);
        estimator.update(80, start + PACKET_INTERVAL);
        assert!(estimator.jitter() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let mut estimator = JitterEstimator::new(8000);
        let start = SystemTime::UNIX_EPOCH;
        estimator.update(0, start);
        estimator.update(160, start + Duration::from_millis(40));
        assert!(estimator.jitter() > 0.0);
        assert_eq!(estimator.max_jitter(), estimator.jitter());

        // Back on time, the estimate decays but the peak stays
        estimator.update(320, start + Duration::from_millis(60));
        assert!(estimator.jitter() < estimator.max_jitter());

        estimator.reset();
        assert_eq!(estimator.jitter(), 0.0);
        assert_eq!(estimator.max_jitter(), 0.0);
        assert_eq!(estimator.samples(), 0);
    }
}
