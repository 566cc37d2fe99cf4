use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest combined shard count a Reed-Solomon FEC group can carry.
pub const MAX_FEC_SHARDS: usize = 256;

/// Transport protocol driven by a test run.
///
/// Exactly one protocol is active per run. `Kcp` and `Rudp` are the two
/// reliable-UDP flavours; both need a matching engine on each peer.
///
/// # Examples
///
/// ```
/// use rperf3_transport::{Config, Protocol};
///
/// let config = Config::client("127.0.0.1".to_string(), 5201)
///     .with_protocol(Protocol::Kcp);
/// assert_eq!(config.protocol.name(), "kcp");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Plain TCP stream
    Tcp,
    /// Reliable UDP with FEC, KCP framing
    Kcp,
    /// Reliable UDP with FEC, RUDP framing (exposes RTO and repeat counters)
    Rudp,
}

impl Protocol {
    /// Identifier used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Kcp => "kcp",
            Protocol::Rudp => "rudp",
        }
    }

    /// Whether the protocol runs over a reliable-UDP engine.
    pub fn is_reliable_udp(&self) -> bool {
        matches!(self, Protocol::Kcp | Protocol::Rudp)
    }
}

/// Test configuration consumed by the protocol adapters.
///
/// The harness owns this; the adapters only read it. Reliable-UDP knobs
/// (shards, windows, flush interval, fast resend) are ignored by TCP.
///
/// # Examples
///
/// ```
/// use rperf3_transport::{Config, Protocol};
/// use std::time::Duration;
///
/// let config = Config::client("192.168.1.100".to_string(), 5201)
///     .with_protocol(Protocol::Rudp)
///     .with_fec(10, 3)
///     .with_window(512, 1024)
///     .with_no_delay(true)
///     .with_duration(Duration::from_secs(30));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Protocol to use
    pub protocol: Protocol,

    /// Target address (client side)
    pub addr: String,

    /// Listening or target port
    pub port: u16,

    /// Size of each stream's transfer buffer in bytes
    pub buffer_size: usize,

    /// Test duration
    pub duration: Duration,

    /// Reporting interval
    pub interval: Duration,

    /// Disable Nagle (TCP) or enable no-delay mode (reliable UDP)
    pub no_delay: bool,

    /// FEC data shards
    pub data_shards: usize,

    /// FEC parity shards
    pub parity_shards: usize,

    /// OS read buffer size in bytes
    pub read_buf_size: usize,

    /// OS write buffer size in bytes
    pub write_buf_size: usize,

    /// Send window in segments
    pub snd_wnd: u32,

    /// Receive window in segments
    pub rcv_wnd: u32,

    /// Fast-resend threshold (duplicate ACKs), 0 disables
    pub fast_resend: u32,

    /// Internal flush interval in milliseconds
    pub flush_interval: u32,

    /// Turn congestion control off
    pub no_cong: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            addr: "127.0.0.1".to_string(),
            port: 5201,
            buffer_size: 128 * 1024, // 128 KB
            duration: Duration::from_secs(10),
            interval: Duration::from_secs(1),
            no_delay: false,
            data_shards: 0,
            parity_shards: 0,
            read_buf_size: 4 * 1024 * 1024,
            write_buf_size: 4 * 1024 * 1024,
            snd_wnd: 512,
            rcv_wnd: 1024,
            fast_resend: 2,
            flush_interval: 10,
            no_cong: false,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server-side configuration listening on `port`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rperf3_transport::Config;
    ///
    /// let config = Config::server(5201);
    /// assert_eq!(config.port, 5201);
    /// ```
    pub fn server(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Creates a client-side configuration dialing `addr:port`.
    pub fn client(addr: String, port: u16) -> Self {
        Self {
            addr,
            port,
            ..Default::default()
        }
    }

    /// Sets the protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the per-stream transfer buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the test duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the reporting interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enables or disables no-delay.
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// Sets the FEC shard counts. Both peers must agree on these.
    pub fn with_fec(mut self, data_shards: usize, parity_shards: usize) -> Self {
        self.data_shards = data_shards;
        self.parity_shards = parity_shards;
        self
    }

    /// Sets the OS read and write buffer sizes.
    ///
    /// On a reliable-UDP listener every accepted session shares one packet
    /// socket, so size these for all concurrent streams together.
    pub fn with_socket_buffers(mut self, read_buf_size: usize, write_buf_size: usize) -> Self {
        self.read_buf_size = read_buf_size;
        self.write_buf_size = write_buf_size;
        self
    }

    /// Sets the send and receive windows.
    pub fn with_window(mut self, snd_wnd: u32, rcv_wnd: u32) -> Self {
        self.snd_wnd = snd_wnd;
        self.rcv_wnd = rcv_wnd;
        self
    }

    /// Sets the fast-resend threshold.
    pub fn with_fast_resend(mut self, fast_resend: u32) -> Self {
        self.fast_resend = fast_resend;
        self
    }

    /// Sets the flush interval in milliseconds.
    pub fn with_flush_interval(mut self, flush_interval: u32) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Enables or disables congestion control.
    pub fn with_no_cong(mut self, no_cong: bool) -> Self {
        self.no_cong = no_cong;
        self
    }

    /// `host:port` the client dials.
    pub fn target(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Checks the FEC shard counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when parity shards are requested without data
    /// shards, or when the group exceeds [`MAX_FEC_SHARDS`].
    pub fn validate_fec(&self) -> Result<()> {
        if self.parity_shards > 0 && self.data_shards == 0 {
            return Err(Error::Config(format!(
                "{} parity shards requested without data shards",
                self.parity_shards
            )));
        }
        let oversized = self
            .data_shards
            .checked_add(self.parity_shards)
            .map_or(true, |total| total > MAX_FEC_SHARDS);
        if oversized {
            return Err(Error::Config(format!(
                "FEC group of {}+{} shards exceeds {}",
                self.data_shards, self.parity_shards, MAX_FEC_SHARDS
            )));
        }
        Ok(())
    }

    /// Checks the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero buffer size, a zero interval, or
    /// invalid FEC parameters on a reliable-UDP protocol.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer size must be non-zero".to_string()));
        }
        if self.interval.is_zero() {
            return Err(Error::Config("reporting interval must be non-zero".to_string()));
        }
        if self.protocol.is_reliable_udp() {
            self.validate_fec()?;
        }
        Ok(())
    }
}
