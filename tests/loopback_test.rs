use anyhow::Result;
use once_cell::sync::Lazy;
use rocc_harness::HarnessError;
use rocc_harness::net::SocketTuning;
use rocc_harness::receiver::{ServeMode, SinkServer};
use rocc_harness::sender::{AppLimitedSender, SenderConfig, TrafficPattern};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, sleep, timeout};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

static INIT: Lazy<()> = Lazy::new(|| {
    let _ = rocc_harness::logging::init();
});

async fn sink(mode: ServeMode) -> Result<SinkServer<TcpListener>> {
    Lazy::force(&INIT);
    Ok(SinkServer::<TcpListener>::bind("127.0.0.1:0", 5)
        .await?
        .with_mode(mode))
}

fn config(port: u16, tuning: SocketTuning, pattern: TrafficPattern) -> SenderConfig {
    SenderConfig {
        addr: "127.0.0.1".to_string(),
        port,
        tuning,
        pattern,
    }
}

fn small_pattern() -> TrafficPattern {
    TrafficPattern::new(MIB, 64 * KIB as usize, 2, Duration::from_millis(200)).unwrap()
}

#[tokio::test]
async fn transfer_reaches_receiver_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let port = server.local_addr()?.port();
    let serve = tokio::spawn(async move { server.serve(Some(1)).await });

    // rocc is usually not loaded, which must not stop the run
    let sender = AppLimitedSender::<TcpStream>::new(config(
        port,
        SocketTuning::with_congestion("rocc"),
        small_pattern(),
    ));
    let report = sender.run().await?;
    assert_eq!(report.total_bytes, 2 * MIB);
    assert_eq!(report.bursts.len(), 2);
    assert!(report.bursts.iter().all(|burst| burst.bytes == MIB));
    // The first burst starts right away; the pause sits between the bursts
    assert!(report.bursts[0].offset < Duration::from_millis(200));
    assert!(report.gap_before(1).unwrap() >= Duration::from_millis(200));

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].bytes, 2 * MIB);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn congestion_is_selected_before_connect_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let port = server.local_addr()?.port();
    let serve = tokio::spawn(async move { server.serve(Some(1)).await });

    let tuning = SocketTuning {
        congestion: Some("reno".to_string()),
        require_congestion: true,
    };
    let pattern = TrafficPattern::new(64 * KIB, 64 * KIB as usize, 1, Duration::ZERO)?;
    let report = AppLimitedSender::<TcpStream>::new(config(port, tuning, pattern))
        .run()
        .await?;
    assert_eq!(report.congestion_in_use.as_deref(), Some("reno"));

    timeout(Duration::from_secs(10), serve).await???;
    Ok(())
}

#[tokio::test]
async fn required_congestion_failure_is_fatal_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let port = server.local_addr()?.port();

    let tuning = SocketTuning {
        congestion: Some("no-such-cc".to_string()),
        require_congestion: true,
    };
    let err = AppLimitedSender::<TcpStream>::new(config(port, tuning, small_pattern()))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::Congestion { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn receiver_closing_mid_transfer_test() -> Result<()> {
    Lazy::force(&INIT);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        let mut buf = vec![0u8; 32 * 1024];
        stream.read(&mut buf).await?;
        // Closing with unread data resets the connection
        drop(stream);
        anyhow::Ok(())
    });

    let pattern = TrafficPattern::new(4 * MIB, 64 * KIB as usize, 2, Duration::from_millis(300))?;
    let sender = AppLimitedSender::<TcpStream>::new(config(port, SocketTuning::default(), pattern));
    let result = timeout(Duration::from_secs(10), sender.run()).await?;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn sequential_reuse_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let port = server.local_addr()?.port();
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    let sender = AppLimitedSender::<TcpStream>::new(config(port, SocketTuning::default(), small_pattern()));
    sender.run().await?;
    sender.run().await?;

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.bytes == 2 * MIB));
    assert_ne!(reports[0].peer, reports[1].peer);
    Ok(())
}

#[tokio::test]
async fn empty_stream_is_not_an_error_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let addr = server.local_addr()?;
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    for _ in 0..2 {
        let mut stream = TcpStream::connect(addr).await?;
        stream.shutdown().await?;
    }

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.bytes == 0));
    Ok(())
}

#[allow(deprecated)]
async fn send_then_reset(addr: std::net::SocketAddr) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&[b'.'; 1024]).await?;
    // Give the sink time to read, then abort instead of closing
    sleep(Duration::from_millis(100)).await;
    stream.set_linger(Some(Duration::ZERO))?;
    drop(stream);
    Ok(())
}

#[tokio::test]
async fn sequential_sink_stops_on_read_error_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let addr = server.local_addr()?;
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    send_then_reset(addr).await?;

    let result = timeout(Duration::from_secs(10), serve).await??;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn concurrent_sink_survives_read_error_test() -> Result<()> {
    let server = sink(ServeMode::Concurrent).await?;
    let addr = server.local_addr()?;
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    send_then_reset(addr).await?;
    let sender = AppLimitedSender::<TcpStream>::new(config(
        addr.port(),
        SocketTuning::default(),
        small_pattern(),
    ));
    sender.run().await?;

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].bytes, 2 * MIB);
    Ok(())
}

#[tokio::test]
async fn concurrent_sink_overlaps_peers_test() -> Result<()> {
    let server = sink(ServeMode::Concurrent).await?;
    let port = server.local_addr()?.port();
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    let pattern = TrafficPattern::new(MIB, 64 * KIB as usize, 2, Duration::from_millis(500))?;
    let first =
        AppLimitedSender::<TcpStream>::new(config(port, SocketTuning::default(), pattern.clone()));
    let second = AppLimitedSender::<TcpStream>::new(config(port, SocketTuning::default(), pattern));

    let (a, b) = tokio::join!(first.run(), second.run());
    a?;
    b?;

    // Both peers are drained from the moment they connect, so each
    // connection spans its sender's pause
    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 2);
    for report in reports {
        assert_eq!(report.bytes, 2 * MIB);
        assert!(report.elapsed >= Duration::from_millis(400));
    }
    Ok(())
}

/// Opens a peer that writes a little and stays open until `hold` elapses.
async fn hold_open(addr: std::net::SocketAddr, hold: Duration) -> Result<std::net::SocketAddr> {
    let mut stream = TcpStream::connect(addr).await?;
    let local = stream.local_addr()?;
    stream.write_all(&[b'.'; 1024]).await?;
    tokio::spawn(async move {
        sleep(hold).await;
        stream.shutdown().await
    });
    Ok(local)
}

async fn short_peer(addr: std::net::SocketAddr) -> Result<std::net::SocketAddr> {
    let mut stream = TcpStream::connect(addr).await?;
    let local = stream.local_addr()?;
    stream.write_all(&[b'.'; 1024]).await?;
    stream.shutdown().await?;
    Ok(local)
}

#[tokio::test]
async fn sequential_sink_waits_for_current_peer_test() -> Result<()> {
    let server = sink(ServeMode::Sequential).await?;
    let addr = server.local_addr()?;
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    let first = hold_open(addr, Duration::from_millis(500)).await?;
    sleep(Duration::from_millis(50)).await;
    let second = short_peer(addr).await?;

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 2);
    // The second peer closed long before the first, but is only drained after it
    assert_eq!(reports[0].peer, first);
    assert_eq!(reports[1].peer, second);
    assert!(reports[0].elapsed >= Duration::from_millis(400));
    assert!(reports[1].elapsed < Duration::from_millis(400));
    Ok(())
}

#[tokio::test]
async fn concurrent_sink_does_not_wait_for_current_peer_test() -> Result<()> {
    let server = sink(ServeMode::Concurrent).await?;
    let addr = server.local_addr()?;
    let serve = tokio::spawn(async move { server.serve(Some(2)).await });

    let first = hold_open(addr, Duration::from_millis(500)).await?;
    sleep(Duration::from_millis(50)).await;
    let second = short_peer(addr).await?;

    let reports = timeout(Duration::from_secs(10), serve).await???;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].peer, second);
    assert_eq!(reports[1].peer, first);
    Ok(())
}
