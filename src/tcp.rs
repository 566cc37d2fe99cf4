//! Plain TCP: session, listener and adapter.
//!
//! TCP needs no accept handshake since the listener's accept already proves
//! the peer is there. Statistics come from the kernel's per-connection
//! `TCP_INFO` on Linux.

use crate::context::TestContext;
use crate::measurements::{as_micros, IntervalResult};
use crate::outcome::IoOutcome;
use crate::protocol::{recv_buffer, send_buffer, ProtocolAdapter};
use crate::session::{MeasuredSession, NoDelay, SessionListener};
use crate::stream::Stream;
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, error};
use socket2::SockRef;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Instant};

pub const TCP_NAME: &str = "tcp";

/// Kernel statistics for one TCP connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpInfoSample {
    pub total_retrans: u64,
    pub rtt: Duration,
    pub rttvar: Duration,
    pub snd_cwnd: u64,
    pub pmtu: u64,
}

/// Reads `TCP_INFO` for `stream`.
#[cfg(target_os = "linux")]
pub fn tcp_info(stream: &TcpStream) -> io::Result<TcpInfoSample> {
    use std::mem;
    use std::os::unix::io::AsRawFd;

    // leading part of struct tcp_info, up to tcpi_total_retrans
    #[repr(C)]
    struct TcpInfo {
        state: u8,
        ca_state: u8,
        retransmits: u8,
        probes: u8,
        backoff: u8,
        options: u8,
        snd_wscale: u8,
        rcv_wscale: u8,

        rto: u32,
        ato: u32,
        snd_mss: u32,
        rcv_mss: u32,

        unacked: u32,
        sacked: u32,
        lost: u32,
        retrans: u32,
        fackets: u32,

        last_data_sent: u32,
        last_ack_sent: u32,
        last_data_recv: u32,
        last_ack_recv: u32,

        pmtu: u32,
        rcv_ssthresh: u32,
        rtt: u32,
        rttvar: u32,
        snd_ssthresh: u32,
        snd_cwnd: u32,
        advmss: u32,
        reordering: u32,

        rcv_rtt: u32,
        rcv_space: u32,

        total_retrans: u32,
    }

    let fd = stream.as_raw_fd();
    let mut info: TcpInfo = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<TcpInfo>() as libc::socklen_t;

    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_TCP,
            libc::TCP_INFO,
            &mut info as *mut TcpInfo as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(TcpInfoSample {
        total_retrans: u64::from(info.total_retrans),
        rtt: Duration::from_micros(u64::from(info.rtt)),
        rttvar: Duration::from_micros(u64::from(info.rttvar)),
        snd_cwnd: u64::from(info.snd_cwnd),
        pmtu: u64::from(info.pmtu),
    })
}

#[cfg(not(target_os = "linux"))]
pub fn tcp_info(_stream: &TcpStream) -> io::Result<TcpInfoSample> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "TCP_INFO is only read on Linux",
    ))
}

async fn within_deadline<T>(
    deadline: Option<Instant>,
    io: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(deadline) => time::timeout_at(deadline, io).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, "i/o deadline reached")
        })?,
        None => io.await,
    }
}

/// [`MeasuredSession`] over a tokio `TcpStream`.
pub struct TcpSession {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl TcpSession {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            deadline: None,
        }
    }

    pub async fn connect(addr: &str) -> io::Result<Self> {
        Ok(Self::new(TcpStream::connect(addr).await?))
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

#[async_trait]
impl MeasuredSession for TcpSession {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        within_deadline(self.deadline, self.stream.read(buf)).await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stream = &mut self.stream;
        within_deadline(self.deadline, async move {
            stream.write_all(buf).await?;
            Ok(buf.len())
        })
        .await
    }

    fn set_read_buffer(&mut self, bytes: usize) -> io::Result<()> {
        SockRef::from(&self.stream).set_recv_buffer_size(bytes)
    }

    fn set_write_buffer(&mut self, bytes: usize) -> io::Result<()> {
        SockRef::from(&self.stream).set_send_buffer_size(bytes)
    }

    fn set_dscp(&mut self, dscp: u8) -> io::Result<()> {
        SockRef::from(&self.stream).set_tos(u32::from(dscp) << 2)
    }

    fn set_no_delay(&mut self, tuning: NoDelay) -> io::Result<()> {
        self.stream.set_nodelay(tuning.nodelay)
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn rtt_var(&self) -> Duration {
        tcp_info(&self.stream)
            .map(|info| info.rttvar)
            .unwrap_or(Duration::ZERO)
    }

    fn retransmits(&self) -> Option<u64> {
        tcp_info(&self.stream).ok().map(|info| info.total_retrans)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

/// [`SessionListener`] over a tokio `TcpListener`.
pub struct TcpSessionListener {
    listener: TcpListener,
}

impl TcpSessionListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?))
    }

    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl SessionListener for TcpSessionListener {
    async fn accept(&self) -> io::Result<Box<dyn MeasuredSession>> {
        let (stream, peer) = self.listener.accept().await?;
        debug!("tcp accepted connection from {peer}");
        Ok(Box::new(TcpSession::new(stream)))
    }

    // accepted sockets inherit these
    fn set_read_buffer(&self, bytes: usize) -> io::Result<()> {
        SockRef::from(&self.listener).set_recv_buffer_size(bytes)
    }

    fn set_write_buffer(&self, bytes: usize) -> io::Result<()> {
        SockRef::from(&self.listener).set_send_buffer_size(bytes)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// TCP adapter. Listens through the harness's existing listener.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProto;

impl TcpProto {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolAdapter for TcpProto {
    fn name(&self) -> &'static str {
        TCP_NAME
    }

    async fn listen(&self, test: &TestContext) -> Result<Arc<dyn SessionListener>> {
        debug!("Enter TCP listen");
        test.listener().ok_or_else(|| Error::Bind {
            addr: format!(":{}", test.config.port),
            source: io::Error::new(io::ErrorKind::NotFound, "no harness listener to reuse"),
        })
    }

    async fn accept(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>> {
        debug!("Enter TCP accept");
        let listener = test.listener().ok_or_else(|| {
            Error::Accept(io::Error::new(
                io::ErrorKind::NotConnected,
                "no harness listener to accept on",
            ))
        })?;
        listener.accept().await.map_err(Error::Accept)
    }

    async fn connect(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>> {
        debug!("Enter TCP connect");
        let addr = test.config.target();
        let session = TcpSession::connect(&addr)
            .await
            .map_err(|source| Error::Dial { addr, source })?;
        Ok(Box::new(session))
    }

    async fn send(&self, stream: &mut Stream) -> IoOutcome {
        send_buffer(TCP_NAME, stream).await
    }

    async fn recv(&self, stream: &mut Stream) -> IoOutcome {
        recv_buffer(TCP_NAME, stream).await
    }

    fn init(&self, test: &TestContext, streams: &mut [Stream]) -> Result<()> {
        if !test.config.no_delay {
            return Ok(());
        }
        let tuning = NoDelay::from_config(&test.config);
        for stream in streams.iter_mut() {
            if let Err(e) = stream.session_mut().set_no_delay(tuning) {
                error!("tcp stream {}: setting no-delay failed: {e}", stream.id);
                return Err(Error::Tuning(format!(
                    "tcp no-delay on stream {}: {e}",
                    stream.id
                )));
            }
        }
        Ok(())
    }

    fn stats_callback(
        &self,
        _test: &TestContext,
        stream: &mut Stream,
        interval: &mut IntervalResult,
    ) -> Result<()> {
        let retransmits = stream.session().retransmits();
        let rtt = as_micros(stream.session().rtt_var());

        let rp = &mut stream.result;
        if let Some(total) = retransmits {
            interval.retrans = rp.retrans.advance(total);
        }
        interval.rtt = rtt;
        rp.record_rtt(rtt);
        Ok(())
    }

    fn teardown(&self, _test: &TestContext) -> Result<()> {
        Ok(())
    }
}
