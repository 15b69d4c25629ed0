use super::congestion;
use crate::error::HarnessError;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use core::net::SocketAddr;
use std::io;
use std::os::fd::AsFd;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{
    TcpListener as TokioTcpListener, TcpSocket, TcpStream as TokioTcpStream, lookup_host,
};
use tracing::{debug, warn};
use turmoil::net::{TcpListener as TurmoilTcpListener, TcpStream as TurmoilTcpStream};

/// Per-socket knobs applied before a connection is established.
#[derive(Debug, Clone, Default)]
pub struct SocketTuning {
    /// Congestion-control algorithm to request, by name.
    pub congestion: Option<String>,
    /// Fail the connection instead of warning when the algorithm is rejected.
    pub require_congestion: bool,
}

impl SocketTuning {
    pub fn with_congestion(algorithm: &str) -> Self {
        Self {
            congestion: Some(algorithm.to_string()),
            require_congestion: false,
        }
    }

    pub fn apply(&self, sock: &impl AsFd) -> Result<()> {
        let Some(algorithm) = &self.congestion else {
            return Ok(());
        };
        match congestion::set_congestion(sock, algorithm) {
            Ok(()) => {
                debug!(algorithm = %algorithm, "Selected congestion control");
                Ok(())
            }
            Err(source) if self.require_congestion => Err(HarnessError::Congestion {
                algorithm: algorithm.clone(),
                source,
            }
            .into()),
            Err(e) => {
                warn!(algorithm = %algorithm, error = %e, "Could not select congestion control, using the system default");
                Ok(())
            }
        }
    }
}

#[async_trait]
pub trait ConnectStream: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    async fn connect(addr: &str, tuning: &SocketTuning) -> Result<Self>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
    /// Congestion-control algorithm in use, when the platform can report it.
    fn congestion(&self) -> Option<String>;
}

fn new_socket(addr: &SocketAddr) -> io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}

fn no_address(addr: &str, last_err: Option<io::Error>) -> anyhow::Error {
    match last_err {
        Some(e) => e.into(),
        None => anyhow!("{} did not resolve to any address", addr),
    }
}

#[async_trait]
impl ConnectStream for TokioTcpStream {
    async fn connect(addr: &str, tuning: &SocketTuning) -> Result<Self> {
        let mut last_err = None;
        for sock_addr in lookup_host(addr).await? {
            let socket = new_socket(&sock_addr)?;
            // The algorithm has to be chosen before the handshake
            tuning.apply(&socket)?;
            match socket.connect(sock_addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(no_address(addr, last_err))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TokioTcpStream::peer_addr(self)
    }

    fn congestion(&self) -> Option<String> {
        congestion::congestion(self)
    }
}

#[async_trait]
impl ConnectStream for TurmoilTcpStream {
    async fn connect(addr: &str, tuning: &SocketTuning) -> Result<Self> {
        if let Some(algorithm) = &tuning.congestion {
            debug!(algorithm = %algorithm, "Simulated network has no congestion control to select");
        }
        Ok(TurmoilTcpStream::connect(addr).await?)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TurmoilTcpStream::peer_addr(self)
    }

    fn congestion(&self) -> Option<String> {
        None
    }
}

#[async_trait]
pub trait Listener: Send + Sync + Unpin + Sized {
    type Stream: ConnectStream + 'static;

    async fn bind(addr: &str, backlog: u32) -> Result<Self>;
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for TokioTcpListener {
    type Stream = TokioTcpStream;

    async fn bind(addr: &str, backlog: u32) -> Result<Self> {
        let mut last_err = None;
        for sock_addr in lookup_host(addr).await? {
            let socket = new_socket(&sock_addr)?;
            socket.set_reuseaddr(true)?;
            match socket.bind(sock_addr) {
                Ok(()) => return Ok(socket.listen(backlog)?),
                Err(e) => last_err = Some(e),
            }
        }
        Err(no_address(addr, last_err))
    }

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        TokioTcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TokioTcpListener::local_addr(self)
    }
}

#[async_trait]
impl Listener for TurmoilTcpListener {
    type Stream = TurmoilTcpStream;

    // The simulator has no accept queue to size
    async fn bind(addr: &str, _backlog: u32) -> Result<Self> {
        Ok(TurmoilTcpListener::bind(addr).await?)
    }

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        TurmoilTcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TurmoilTcpListener::local_addr(self)
    }
}
