//! Time and clock utilities for RTCP
//!
//! NTP timestamps for Sender Reports, the compact 1/65536 s form used by
//! LSR/DLSR, and the linear mapping between wall-clock time and an RTP media
//! clock.

mod ntp;

pub use ntp::{
    compact_ntp_to_duration, duration_to_compact_ntp, NtpTimestamp, NTP_UNIX_OFFSET_SECS,
};

use std::time::{Duration, SystemTime};

use crate::error::Error;
use crate::{Result, RtpTimestamp};

/// Signed number of seconds from `from` to `to`
pub fn signed_seconds_between(from: SystemTime, to: SystemTime) -> f64 {
    match to.duration_since(from) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Relation between a media clock and wall-clock time
///
/// `rtp = base_rtp_timestamp + round((t - base_wall_clock) * clock_rate)`,
/// modulo 2^32. The clock rate comes from the negotiated codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtpClock {
    base_rtp_timestamp: RtpTimestamp,
    base_wall_clock: SystemTime,
    clock_rate: u32,
}

impl RtpClock {
    pub fn new(base_rtp_timestamp: RtpTimestamp, base_wall_clock: SystemTime, clock_rate: u32) -> Result<Self> {
        if clock_rate == 0 {
            return Err(Error::invalid_field("RTP clock rate must be non-zero"));
        }
        Ok(Self {
            base_rtp_timestamp,
            base_wall_clock,
            clock_rate,
        })
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn base_rtp_timestamp(&self) -> RtpTimestamp {
        self.base_rtp_timestamp
    }

    pub fn base_wall_clock(&self) -> SystemTime {
        self.base_wall_clock
    }

    /// RTP timestamp corresponding to wall-clock `time`
    pub fn rtp_timestamp_at(&self, time: SystemTime) -> RtpTimestamp {
        let ticks = (signed_seconds_between(self.base_wall_clock, time) * self.clock_rate as f64).round();
        // Reduce modulo 2^32 before adding so negative offsets wrap backwards
        let offset = (ticks as i64).rem_euclid(1 << 32) as u32;
        self.base_rtp_timestamp.wrapping_add(offset)
    }

    /// Wall-clock time of an RTP timestamp within ±2^31 ticks of the base
    pub fn wall_clock_at(&self, timestamp: RtpTimestamp) -> SystemTime {
        let ticks = timestamp.wrapping_sub(self.base_rtp_timestamp) as i32 as f64;
        let secs = ticks / self.clock_rate as f64;
        if secs >= 0.0 {
            self.base_wall_clock + Duration::from_secs_f64(secs)
        } else {
            self.base_wall_clock - Duration::from_secs_f64(-secs)
        }
    }
}

/// Typical clock rates for common codecs
pub mod clock_rates {
    /// G.711, G.726, G.729 (8kHz)
    pub const AUDIO_8KHZ: u32 = 8000;

    /// G.722 (16kHz)
    pub const AUDIO_16KHZ: u32 = 16000;

    /// Opus (48kHz)
    pub const AUDIO_48KHZ: u32 = 48000;

    /// Video (90kHz)
    pub const VIDEO_90KHZ: u32 = 90000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn t(secs: u64, millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_millis(millis)
    }

    #[test]
    fn test_rtp_clock_linear_mapping() {
        let clock = RtpClock::new(1000, t(100, 0), clock_rates::AUDIO_8KHZ).unwrap();

        assert_eq!(clock.rtp_timestamp_at(t(100, 0)), 1000);
        assert_eq!(clock.rtp_timestamp_at(t(100, 20)), 1160);
        assert_eq!(clock.rtp_timestamp_at(t(101, 0)), 9000);
        // Before the base runs backwards
        assert_eq!(clock.rtp_timestamp_at(t(99, 875)), 0);
        assert_eq!(clock.rtp_timestamp_at(t(99, 874)), u32::MAX - 7);
    }

    #[test]
    fn test_rtp_clock_wraps() {
        let clock = RtpClock::new(u32::MAX - 79, t(0, 0), clock_rates::VIDEO_90KHZ).unwrap();
        // 1ms at 90kHz = 90 ticks
        assert_eq!(clock.rtp_timestamp_at(t(0, 1)), 10);
        assert_eq!(clock.wall_clock_at(10), t(0, 1));
    }

    #[test]
    fn test_rtp_clock_inverse() {
        let clock = RtpClock::new(5000, t(50, 0), clock_rates::AUDIO_48KHZ).unwrap();
        let ts = clock.rtp_timestamp_at(t(52, 500));
        assert_eq!(ts, 5000 + 120_000);
        assert_eq!(clock.wall_clock_at(ts), t(52, 500));
        assert_eq!(clock.wall_clock_at(5000u32.wrapping_sub(48_000)), t(49, 0));
    }

    #[test]
    fn test_rtp_clock_rejects_zero_rate() {
        assert!(matches!(RtpClock::new(0, UNIX_EPOCH, 0), Err(Error::InvalidFieldValue(_))));
    }

    #[test]
    fn test_signed_seconds() {
        assert_eq!(signed_seconds_between(t(10, 0), t(12, 500)), 2.5);
        assert_eq!(signed_seconds_between(t(12, 500), t(10, 0)), -2.5);
    }
}
