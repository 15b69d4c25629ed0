use crate::error::HarnessError;
use std::time::Duration;

pub const DEFAULT_BURST_BYTES: u64 = 8 * 1024 * 1024; // 8MiB
pub const DEFAULT_CHUNK_BYTES: usize = 1024 * 1024; // 1MiB per write
pub const DEFAULT_BURSTS: u32 = 2;
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2);

/// Every byte on the wire.
pub const FILL_BYTE: u8 = b'.';

/// Bursts of `burst_bytes` separated by `pause`, written `chunk_bytes` at a time.
/// The idle gaps leave the flow application limited.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficPattern {
    burst_bytes: u64,
    chunk_bytes: usize,
    bursts: u32,
    pause: Duration,
}

impl TrafficPattern {
    pub fn new(
        burst_bytes: u64,
        chunk_bytes: usize,
        bursts: u32,
        pause: Duration,
    ) -> Result<Self, HarnessError> {
        if burst_bytes == 0 {
            return Err(HarnessError::InvalidPattern("burst size must be non-zero"));
        }
        if chunk_bytes == 0 {
            return Err(HarnessError::InvalidPattern("write size must be non-zero"));
        }
        if bursts == 0 {
            return Err(HarnessError::InvalidPattern("bursts must be at least 1"));
        }
        if burst_bytes.checked_mul(bursts as u64).is_none() {
            return Err(HarnessError::InvalidPattern("total volume overflows"));
        }
        Ok(Self {
            burst_bytes,
            chunk_bytes,
            bursts,
            pause,
        })
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    pub fn bursts(&self) -> u32 {
        self.bursts
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn total_bytes(&self) -> u64 {
        self.burst_bytes * self.bursts as u64
    }

    /// Cumulative byte count at which burst `burst` (zero based) is complete.
    pub fn target_after(&self, burst: u32) -> u64 {
        self.burst_bytes * (burst as u64 + 1)
    }
}

impl Default for TrafficPattern {
    fn default() -> Self {
        Self {
            burst_bytes: DEFAULT_BURST_BYTES,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            bursts: DEFAULT_BURSTS,
            pause: DEFAULT_PAUSE,
        }
    }
}
