use std::io;

/// Failures the harness distinguishes from plain I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A write accepted zero bytes, so the peer is gone.
    #[error("socket connection broken after {sent} bytes")]
    ConnectionBroken { sent: u64 },

    /// The kernel rejected the requested congestion-control algorithm and
    /// the run was configured to require it.
    #[error("failed to select congestion control {algorithm:?}: {source}")]
    Congestion {
        algorithm: String,
        #[source]
        source: io::Error,
    },

    /// The traffic pattern cannot produce any traffic.
    #[error("invalid traffic pattern: {0}")]
    InvalidPattern(&'static str),
}
