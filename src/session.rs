//! The measured-session capability every transport plugs in through.
//!
//! A session is a connected, ordered, full-duplex byte stream. Tuning knobs a
//! transport does not have fall back to an `Unsupported` error, which callers
//! treat as a soft failure.

use crate::config::Config;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Expedited Forwarding, applied to every reliable-UDP session.
pub const DSCP_EXPEDITED: u8 = 46;

/// MTU applied to every reliable-UDP session.
pub const SESSION_MTU: usize = 1400;

/// How far ahead of tuning time the session deadline is placed. Not renewed.
pub const SESSION_DEADLINE: Duration = Duration::from_secs(60);

/// No-delay tuple for reliable-UDP engines; TCP only looks at `nodelay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoDelay {
    pub nodelay: bool,
    /// Internal flush interval in milliseconds
    pub interval: u32,
    /// Fast-resend threshold, 0 disables
    pub resend: u32,
    pub no_congestion: bool,
}

impl NoDelay {
    /// Derives the tuple from the test configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            nodelay: config.no_delay,
            interval: config.flush_interval,
            resend: config.fast_resend,
            no_congestion: config.no_cong,
        }
    }
}

pub(crate) fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} is not supported by this transport"),
    )
}

/// A connected transport endpoint the adapters read, write, tune and sample.
#[async_trait]
pub trait MeasuredSession: Send + Sync {
    /// Reads into `buf`, waiting for data. `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `buf`, returning the number of bytes accepted.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn set_read_buffer(&mut self, bytes: usize) -> io::Result<()>;

    fn set_write_buffer(&mut self, bytes: usize) -> io::Result<()>;

    fn set_window_size(&mut self, _snd_wnd: u32, _rcv_wnd: u32) -> io::Result<()> {
        Err(unsupported("window size"))
    }

    /// Stream framing merges writes into one byte stream instead of keeping
    /// message boundaries.
    fn set_stream_mode(&mut self, _enabled: bool) -> io::Result<()> {
        Err(unsupported("stream mode"))
    }

    fn set_dscp(&mut self, _dscp: u8) -> io::Result<()> {
        Err(unsupported("DSCP marking"))
    }

    fn set_mtu(&mut self, _mtu: usize) -> io::Result<()> {
        Err(unsupported("MTU"))
    }

    fn set_ack_no_delay(&mut self, _enabled: bool) -> io::Result<()> {
        Err(unsupported("ACK no-delay"))
    }

    fn set_no_delay(&mut self, tuning: NoDelay) -> io::Result<()>;

    /// Bounds every later read and write. `None` clears it.
    fn set_deadline(&mut self, deadline: Option<Instant>);

    fn deadline(&self) -> Option<Instant>;

    /// Current smoothed RTT variance estimate.
    fn rtt_var(&self) -> Duration {
        Duration::ZERO
    }

    /// Current retransmission timeout, when the transport exposes it.
    fn rto(&self) -> Option<Duration> {
        None
    }

    /// Cumulative retransmits of this session alone, when the transport keeps
    /// per-session counters.
    fn retransmits(&self) -> Option<u64> {
        None
    }

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

/// Server side endpoint handing out [`MeasuredSession`]s.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Waits for the next peer.
    async fn accept(&self) -> io::Result<Box<dyn MeasuredSession>>;

    fn set_read_buffer(&self, bytes: usize) -> io::Result<()>;

    fn set_write_buffer(&self, bytes: usize) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}
