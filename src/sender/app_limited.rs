use super::TrafficPattern;
use super::pattern::FILL_BYTE;
use crate::error::HarnessError;
use crate::net::utils::{host_port, my_name};
use crate::net::{ConnectStream, SocketTuning};
use crate::report::{BurstReport, SendReport};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::marker::PhantomData;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, info_span, warn};

/// Gateway of the emulated link the harness was first run behind.
pub const DEFAULT_PEER_ADDR: &str = "100.64.0.1";
pub const DEFAULT_CONGESTION: &str = "rocc";

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub addr: String,
    pub port: u16,
    pub tuning: SocketTuning,
    pub pattern: TrafficPattern,
}

impl SenderConfig {
    pub fn new(addr: &str, port: u16) -> Self {
        Self {
            addr: addr.to_string(),
            port,
            tuning: SocketTuning::with_congestion(DEFAULT_CONGESTION),
            pattern: TrafficPattern::default(),
        }
    }
}

/// Writes a fixed volume, goes idle, then writes it again, so the
/// congestion controller sees an application-limited flow.
pub struct AppLimitedSender<S: ConnectStream> {
    config: SenderConfig,
    _stream: PhantomData<S>,
}

impl<S: ConnectStream> AppLimitedSender<S> {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            _stream: PhantomData,
        }
    }

    /// Connects and plays the traffic pattern once. The first failure aborts
    /// the run and drops the connection.
    pub async fn run(&self) -> Result<SendReport> {
        let target = host_port(&self.config.addr, self.config.port);
        info!(target = %target, "Connecting");
        let mut stream = S::connect(&target, &self.config.tuning)
            .await
            .with_context(|| format!("connecting to {}", target))?;
        let peer = stream.peer_addr()?;
        let congestion_in_use = stream.congestion();
        info!(
            peer = %peer,
            congestion = congestion_in_use.as_deref().unwrap_or("unknown"),
            "Connected"
        );

        let pattern = &self.config.pattern;
        let payload = Bytes::from(vec![FILL_BYTE; pattern.chunk_bytes()]);
        let mut sent: u64 = 0;
        let mut bursts = Vec::with_capacity(pattern.bursts() as usize);
        let start = Instant::now();

        for burst in 0..pattern.bursts() {
            if burst > 0 {
                info!(pause = ?pattern.pause(), "Sleeping");
                sleep(pattern.pause()).await;
            }
            let burst_start = Instant::now();
            let offset = burst_start - start;
            let before = sent;
            send_until(&mut stream, &payload, &mut sent, pattern.target_after(burst))
                .instrument(info_span!("burst", index = burst))
                .await?;
            let report = BurstReport {
                bytes: sent - before,
                offset,
                elapsed: burst_start.elapsed(),
            };
            info!(burst, bytes = report.bytes, elapsed = ?report.elapsed, "Burst sent");
            bursts.push(report);
        }

        stream.shutdown().await?;
        let elapsed = start.elapsed();
        info!(bytes = sent, elapsed = ?elapsed, "Finished sending data");

        Ok(SendReport {
            host: my_name().unwrap_or_else(|e| {
                warn!(error = %e, "Could not read the local hostname");
                String::new()
            }),
            peer,
            congestion_requested: self.config.tuning.congestion.clone(),
            congestion_in_use,
            bursts,
            total_bytes: sent,
            elapsed,
        })
    }
}

/// Writes `payload` prefixes until `sent` reaches `target`. Each write is
/// clamped to what is left, so `sent` stops exactly on `target`.
pub(crate) async fn send_until<W>(
    stream: &mut W,
    payload: &[u8],
    sent: &mut u64,
    target: u64,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while *sent < target {
        let want = (target - *sent).min(payload.len() as u64) as usize;
        let n = stream.write(&payload[..want]).await?;
        if n == 0 {
            return Err(HarnessError::ConnectionBroken { sent: *sent }.into());
        }
        *sent += n as u64;
        debug!(written = n, sent = *sent, "write");
    }
    Ok(())
}
