//! Traffic harness for exercising TCP congestion-control algorithms.
//!
//! An application-limited [`sender`] writes bursts separated by idle pauses,
//! and a [`receiver`] sink drains whatever arrives.

pub mod error;
pub mod logging;
pub mod net;
pub mod receiver;
pub mod report;
pub mod sender;

pub use error::HarnessError;
