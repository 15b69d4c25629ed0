use crate::net::Listener;
use crate::report::ConnectionReport;
use anyhow::Result;
use core::net::SocketAddr;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, trace, warn};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_BACKLOG: u32 = 5;
pub const DEFAULT_BUFFER_BYTES: usize = 32 * 1024; // 32KiB per read

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServeMode {
    /// One peer at a time; the next accept waits until the current peer is drained.
    #[default]
    Sequential,
    /// A task per accepted peer.
    Concurrent,
}

/// Accepts connections and discards everything they send.
pub struct SinkServer<L: Listener> {
    listener: L,
    buffer_bytes: usize,
    mode: ServeMode,
}

impl<L: Listener> SinkServer<L> {
    pub async fn bind(addr: &str, backlog: u32) -> Result<Self> {
        let listener = L::bind(addr, backlog).await?;
        info!(addr = %listener.local_addr()?, backlog, "Listening");
        Ok(Self {
            listener,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            mode: ServeMode::default(),
        })
    }

    pub fn with_buffer_bytes(mut self, buffer_bytes: usize) -> Self {
        self.buffer_bytes = buffer_bytes.max(1);
        self
    }

    pub fn with_mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves `limit` connections (forever when `None`) and returns their reports.
    pub async fn serve(&self, limit: Option<usize>) -> Result<Vec<ConnectionReport>> {
        let mut reports = Vec::new();
        self.serve_with(limit, |report| reports.push(report.clone()))
            .await?;
        Ok(reports)
    }

    /// Serves `limit` connections (forever when `None`), handing each finished
    /// connection's report to `on_report`.
    ///
    /// In sequential mode any accept or read error ends the server. In
    /// concurrent mode only accept errors do; a failed peer is logged and
    /// skipped.
    pub async fn serve_with<F>(&self, limit: Option<usize>, on_report: F) -> Result<()>
    where
        F: FnMut(&ConnectionReport),
    {
        match self.mode {
            ServeMode::Sequential => self.serve_sequential(limit, on_report).await,
            ServeMode::Concurrent => self.serve_concurrent(limit, on_report).await,
        }
    }

    async fn serve_sequential<F>(&self, limit: Option<usize>, mut on_report: F) -> Result<()>
    where
        F: FnMut(&ConnectionReport),
    {
        let mut accepted = 0;
        while limit.is_none_or(|limit| accepted < limit) {
            let (stream, peer) = self.listener.accept().await?;
            accepted += 1;
            info!(peer = %peer, "Connected");
            let report = drain(stream, peer, self.buffer_bytes)
                .instrument(info_span!("connection", peer = %peer))
                .await?;
            on_report(&report);
        }
        Ok(())
    }

    async fn serve_concurrent<F>(&self, limit: Option<usize>, mut on_report: F) -> Result<()>
    where
        F: FnMut(&ConnectionReport),
    {
        let mut workers = JoinSet::new();
        let mut accepted = 0;
        while limit.is_none_or(|limit| accepted < limit) {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = result?;
                    accepted += 1;
                    info!(peer = %peer, "Connected");
                    workers.spawn(
                        drain(stream, peer, self.buffer_bytes)
                            .instrument(info_span!("connection", peer = %peer)),
                    );
                }
                Some(done) = workers.join_next(), if !workers.is_empty() => {
                    finish_worker(done, &mut on_report);
                }
            }
        }
        while let Some(done) = workers.join_next().await {
            finish_worker(done, &mut on_report);
        }
        Ok(())
    }
}

fn finish_worker<F>(
    done: Result<io::Result<ConnectionReport>, tokio::task::JoinError>,
    on_report: &mut F,
) where
    F: FnMut(&ConnectionReport),
{
    match done {
        Ok(Ok(report)) => on_report(&report),
        Ok(Err(e)) => warn!(error = %e, "Connection failed"),
        Err(e) => warn!(error = %e, "Connection worker panicked"),
    }
}

/// Reads until the peer closes its side. A zero-length read is the normal
/// end of stream, not an error.
pub async fn drain<S>(mut stream: S, peer: SocketAddr, buffer_bytes: usize) -> io::Result<ConnectionReport>
where
    S: AsyncRead + Unpin,
{
    let start = Instant::now();
    let mut buf = vec![0u8; buffer_bytes];
    let mut received: u64 = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        received += n as u64;
        trace!(read = n, received, "read");
    }
    let report = ConnectionReport {
        peer,
        bytes: received,
        elapsed: start.elapsed(),
    };
    info!(peer = %peer, bytes = received, elapsed = ?report.elapsed, "Finished receiving data");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_counts_until_end_of_stream() {
        let data = vec![b'.'; 100_000];
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let report = drain(&data[..], peer, DEFAULT_BUFFER_BYTES).await.unwrap();
        assert_eq!(report.bytes, 100_000);
        assert_eq!(report.peer, peer);
    }

    #[tokio::test]
    async fn test_drain_empty_stream() {
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let report = drain(tokio::io::empty(), peer, 16).await.unwrap();
        assert_eq!(report.bytes, 0);
    }

    #[tokio::test]
    async fn test_drain_propagates_read_errors() {
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let stream = reset_after_some_bytes(io::ErrorKind::ConnectionReset);
        let err = drain(stream, peer, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    fn reset_after_some_bytes(kind: io::ErrorKind) -> impl AsyncRead + Unpin {
        AsyncReadExt::chain(&b"...."[..], FailingReader(kind))
    }

    struct FailingReader(io::ErrorKind);

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::from(self.0)))
        }
    }
}
