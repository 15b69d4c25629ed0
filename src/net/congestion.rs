//! Selecting a TCP congestion-control algorithm by name.
//!
//! Linux exposes this as the `TCP_CONGESTION` socket option. Other
//! platforms have no portable equivalent, so setting reports
//! `ErrorKind::Unsupported` and reading reports nothing.

use std::io;
use std::os::fd::AsFd;

#[cfg(target_os = "linux")]
use nix::sys::socket::{getsockopt, setsockopt, sockopt::TcpCongestion};
#[cfg(target_os = "linux")]
use std::ffi::OsString;

#[cfg(target_os = "linux")]
pub fn set_congestion(sock: &impl AsFd, algorithm: &str) -> io::Result<()> {
    setsockopt(sock, TcpCongestion, &OsString::from(algorithm))?;

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_congestion(_: &impl AsFd, _: &str) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// The algorithm currently driving the socket.
#[cfg(target_os = "linux")]
pub fn congestion(sock: &impl AsFd) -> Option<String> {
    let name = getsockopt(sock, TcpCongestion).ok()?;
    // The kernel pads the name with NULs up to its fixed buffer size
    Some(name.to_string_lossy().trim_end_matches('\0').to_string())
}

#[cfg(not(target_os = "linux"))]
pub fn congestion(_: &impl AsFd) -> Option<String> {
    None
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_set_and_read_back() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        // reno is built into every kernel and always allowed
        set_congestion(&listener, "reno").unwrap();
        assert_eq!(congestion(&listener).as_deref(), Some("reno"));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let before = congestion(&listener);
        assert!(set_congestion(&listener, "no-such-cc").is_err());
        assert_eq!(congestion(&listener), before);
    }
}
