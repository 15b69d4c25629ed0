//! Transfer summaries printed by the binaries, optionally as JSON lines.

use core::net::SocketAddr;
use serde::{Serialize, Serializer};
use std::time::Duration;

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Megabits per second, zero for an instantaneous transfer.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurstReport {
    pub bytes: u64,
    /// When the burst started, relative to the start of the run.
    #[serde(rename = "offset_ms", serialize_with = "as_millis")]
    pub offset: Duration,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub host: String,
    pub peer: SocketAddr,
    pub congestion_requested: Option<String>,
    pub congestion_in_use: Option<String>,
    pub bursts: Vec<BurstReport>,
    pub total_bytes: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl SendReport {
    /// Idle time between the end of burst `burst - 1` and the start of `burst`.
    pub fn gap_before(&self, burst: usize) -> Option<Duration> {
        let previous = self.bursts.get(burst.checked_sub(1)?)?;
        let current = self.bursts.get(burst)?;
        Some(current.offset.saturating_sub(previous.offset + previous.elapsed))
    }

    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.total_bytes, self.elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub peer: SocketAddr,
    pub bytes: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl ConnectionReport {
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.bytes, self.elapsed)
    }
}
