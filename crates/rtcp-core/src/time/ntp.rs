use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the UNIX epoch (1970-01-01)
pub const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const FRACTION_SCALE: u64 = 1 << 32;

/// NTP timestamp representation (64 bits)
/// As defined in RFC 3550 Section 4: 32.32 fixed point seconds since 1900-01-01
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second in units of 2^-32 s
    pub fraction: u32,
}

impl NtpTimestamp {
    pub fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Current wall-clock time as an NTP timestamp
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert wall-clock time to NTP format
    ///
    /// Only NTP era 0 is representable: times before 1900 map to zero and
    /// times after 2036-02-07 wrap modulo 2^32 seconds.
    pub fn from_system_time(time: SystemTime) -> Self {
        // Signed nanoseconds relative to the NTP epoch
        let since_ntp_epoch: i128 = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => (NTP_UNIX_OFFSET_SECS as i128) * NANOS_PER_SEC as i128 + after.as_nanos() as i128,
            Err(before) => {
                (NTP_UNIX_OFFSET_SECS as i128) * NANOS_PER_SEC as i128 - before.duration().as_nanos() as i128
            }
        };

        if since_ntp_epoch <= 0 {
            return Self::default();
        }

        let seconds = (since_ntp_epoch / NANOS_PER_SEC as i128) as u64;
        let nanos = (since_ntp_epoch % NANOS_PER_SEC as i128) as u64;
        Self {
            seconds: seconds as u32,
            fraction: nanos_to_fraction(nanos),
        }
    }

    /// Convert back to wall-clock time (NTP era 0)
    pub fn to_system_time(&self) -> SystemTime {
        let ntp_epoch = UNIX_EPOCH - Duration::from_secs(NTP_UNIX_OFFSET_SECS);
        ntp_epoch + Duration::new(self.seconds as u64, fraction_to_nanos(self.fraction))
    }

    /// Convert to a 64-bit representation
    pub fn to_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | (self.fraction as u64)
    }

    /// Convert from a 64-bit representation
    pub fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Middle 32 bits of the timestamp (RFC 3550 Section 6.4.1)
    ///
    /// Low 16 bits of the seconds and high 16 bits of the fraction; this is
    /// the value carried in the LSR field of report blocks, in 1/65536 s units.
    pub fn to_compact(&self) -> u32 {
        ((self.seconds & 0x0000FFFF) << 16) | (self.fraction >> 16)
    }
}

impl From<SystemTime> for NtpTimestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl From<NtpTimestamp> for SystemTime {
    fn from(ntp: NtpTimestamp) -> Self {
        ntp.to_system_time()
    }
}

fn nanos_to_fraction(nanos: u64) -> u32 {
    // Round to nearest; nanos < 10^9 keeps the result below 2^32
    ((nanos * FRACTION_SCALE + NANOS_PER_SEC / 2) / NANOS_PER_SEC) as u32
}

fn fraction_to_nanos(fraction: u32) -> u32 {
    ((fraction as u64 * NANOS_PER_SEC + FRACTION_SCALE / 2) >> 32) as u32
}

/// Convert a 1/65536-second quantity (DLSR, compact RTT) to a Duration
pub fn compact_ntp_to_duration(value: u32) -> Duration {
    let secs = (value >> 16) as u64;
    let frac = (value & 0xFFFF) as u64;
    Duration::new(secs, ((frac * NANOS_PER_SEC) >> 16) as u32)
}

/// Convert a Duration to 1/65536-second units, saturating at u32::MAX
pub fn duration_to_compact_ntp(duration: Duration) -> u32 {
    let units = (duration.as_nanos() << 16) / NANOS_PER_SEC as u128;
    units.min(u32::MAX as u128) as u32
}
