//! rperf3-transport - protocol adapters and interval statistics for rperf3
//!
//! This library lets one test harness drive data over interchangeable
//! transports and collect the same per-interval statistics whichever one is
//! active.
//!
//! # Features
//!
//! - One [`ProtocolAdapter`] contract for TCP and reliable-UDP transports
//! - Accept-signal handshake so reliable-UDP peers are data-ready before timing
//! - Uniform [`IoOutcome`] classification of send/recv failures
//! - Interval deltas and running totals from cumulative protocol counters
//! - Asynchronous I/O using tokio, one task per stream

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod handshake;
pub mod interval_reporter;
pub mod measurements;
pub mod outcome;
pub mod protocol;
pub mod reliable_udp;
pub mod session;
pub mod snmp;
pub mod stream;
pub mod tcp;

pub use config::{Config, Protocol};
pub use context::{TestContext, TestState};
pub use driver::{run_stream, Role, StreamEnd};
pub use error::{Error, Result};
pub use measurements::{IntervalResult, StreamResult};
pub use outcome::IoOutcome;
pub use protocol::ProtocolAdapter;
pub use reliable_udp::{ReliableUdpEngine, ReliableUdpProto, Variant};
pub use session::{MeasuredSession, NoDelay, SessionListener};
pub use snmp::{Snmp, SnmpSnapshot};
pub use stream::Stream;
pub use tcp::{TcpProto, TcpSession, TcpSessionListener};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
