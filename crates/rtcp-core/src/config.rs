//! Statistics engine configuration
//!
//! This module defines the configuration consumed by [`SessionStats`](crate::stats::SessionStats).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::packet::MAX_COUNT;
use crate::time::clock_rates;
use crate::{Result, RtpSsrc};

/// RFC 3550 Section 6.3.5 timeout: five deterministic 5 s intervals
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(25);

/// Silence after which an inactive source is forgotten, 5 × the inactivity timeout
pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(125);

/// How long a BYE'd or closed SSRC reads `Closed` before it is forgotten
pub const CLOSED_TOMBSTONE_TIMEOUT: Duration = Duration::from_secs(25);

/// Session statistics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// SSRC of the local participant; report blocks about it yield RTT samples
    pub local_ssrc: RtpSsrc,
    /// Media clock rate in Hz for jitter conversion
    pub clock_rate: u32,
    /// CNAME announced in outgoing SDES
    pub cname: String,
    /// Sources silent this long become inactive
    pub inactivity_timeout: Duration,
    /// Inactive sources silent this long are released; `None` keeps them until closed
    pub removal_timeout: Option<Duration>,
    /// Upper bound on report blocks per SR/RR
    pub max_report_blocks: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            local_ssrc: 0,
            clock_rate: clock_rates::AUDIO_8KHZ,
            cname: String::new(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            removal_timeout: Some(DEFAULT_REMOVAL_TIMEOUT),
            max_report_blocks: MAX_COUNT,
        }
    }
}

impl StatsConfig {
    /// Check values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.clock_rate == 0 {
            return Err(Error::invalid_field("clock rate must be positive"));
        }
        if self.max_report_blocks > MAX_COUNT {
            return Err(Error::invalid_field(format!(
                "max_report_blocks {} exceeds {}",
                self.max_report_blocks, MAX_COUNT
            )));
        }
        if self.cname.len() > u8::MAX as usize {
            return Err(Error::invalid_field(format!(
                "CNAME of {} bytes exceeds 255",
                self.cname.len()
            )));
        }
        Ok(())
    }
}

/// Builder for StatsConfig
#[derive(Debug, Clone, Default)]
pub struct StatsConfigBuilder {
    config: StatsConfig,
}

impl StatsConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_ssrc(mut self, ssrc: RtpSsrc) -> Self {
        self.config.local_ssrc = ssrc;
        self
    }

    pub fn clock_rate(mut self, rate: u32) -> Self {
        self.config.clock_rate = rate;
        self
    }

    pub fn cname(mut self, cname: impl Into<String>) -> Self {
        self.config.cname = cname.into();
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.inactivity_timeout = timeout;
        self
    }

    pub fn removal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.removal_timeout = timeout;
        self
    }

    pub fn max_report_blocks(mut self, max: usize) -> Self {
        self.config.max_report_blocks = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<StatsConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
