// In-memory reliable-UDP engine used as the external transport in tests.
// Sessions are tokio duplex pairs; tuning calls are recorded for inspection.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rperf3_transport::{
    MeasuredSession, NoDelay, ProtocolAdapter, ReliableUdpEngine, SessionListener, Snmp,
    TestContext,
};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

pub const PIPE_CAPACITY: usize = 256 * 1024;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything a session was told during tuning, plus the estimator values it
/// reports back.
#[derive(Debug, Default, Clone)]
pub struct SessionProbe {
    pub read_buf: Option<usize>,
    pub write_buf: Option<usize>,
    pub window: Option<(u32, u32)>,
    pub stream_mode: Option<bool>,
    pub dscp: Option<u8>,
    pub mtu: Option<usize>,
    pub ack_no_delay: Option<bool>,
    pub no_delay: Option<NoDelay>,
    pub rtt_var: Duration,
    pub rto: Option<Duration>,
}

pub type ProbeHandle = Arc<Mutex<SessionProbe>>;

pub struct LoopbackSession {
    io: DuplexStream,
    deadline: Option<Instant>,
    probe: ProbeHandle,
    snmp: Arc<Snmp>,
}

async fn within_deadline<T>(
    deadline: Option<Instant>,
    io: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(deadline) => time::timeout_at(deadline, io)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "deadline"))?,
        None => io.await,
    }
}

impl LoopbackSession {
    pub fn probe(&self) -> ProbeHandle {
        self.probe.clone()
    }
}

/// A connected pair sharing `snmp`, with probe handles for both ends.
pub fn session_pair(snmp: Arc<Snmp>) -> (LoopbackSession, LoopbackSession) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let make = |io| LoopbackSession {
        io,
        deadline: None,
        probe: Arc::new(Mutex::new(SessionProbe::default())),
        snmp: snmp.clone(),
    };
    (make(a), make(b))
}

#[async_trait]
impl MeasuredSession for LoopbackSession {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = within_deadline(self.deadline, self.io.read(buf)).await?;
        self.snmp.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let io = &mut self.io;
        within_deadline(self.deadline, async move {
            io.write_all(buf).await?;
            Ok(buf.len())
        })
        .await?;
        self.snmp.bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.snmp.out_segs.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    fn set_read_buffer(&mut self, bytes: usize) -> io::Result<()> {
        self.probe.lock().read_buf = Some(bytes);
        Ok(())
    }

    fn set_write_buffer(&mut self, bytes: usize) -> io::Result<()> {
        self.probe.lock().write_buf = Some(bytes);
        Ok(())
    }

    fn set_window_size(&mut self, snd_wnd: u32, rcv_wnd: u32) -> io::Result<()> {
        self.probe.lock().window = Some((snd_wnd, rcv_wnd));
        Ok(())
    }

    fn set_stream_mode(&mut self, enabled: bool) -> io::Result<()> {
        self.probe.lock().stream_mode = Some(enabled);
        Ok(())
    }

    fn set_dscp(&mut self, dscp: u8) -> io::Result<()> {
        self.probe.lock().dscp = Some(dscp);
        Ok(())
    }

    fn set_mtu(&mut self, mtu: usize) -> io::Result<()> {
        self.probe.lock().mtu = Some(mtu);
        Ok(())
    }

    fn set_ack_no_delay(&mut self, enabled: bool) -> io::Result<()> {
        self.probe.lock().ack_no_delay = Some(enabled);
        Ok(())
    }

    fn set_no_delay(&mut self, tuning: NoDelay) -> io::Result<()> {
        self.probe.lock().no_delay = Some(tuning);
        Ok(())
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn rtt_var(&self) -> Duration {
        self.probe.lock().rtt_var
    }

    fn rto(&self) -> Option<Duration> {
        self.probe.lock().rto
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

pub struct LoopbackListener {
    port: u16,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<LoopbackSession>>,
    pub buffers: Mutex<(Option<usize>, Option<usize>)>,
}

#[async_trait]
impl SessionListener for LoopbackListener {
    async fn accept(&self) -> io::Result<Box<dyn MeasuredSession>> {
        match self.incoming.lock().await.recv().await {
            Some(session) => Ok(Box::new(session)),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "engine dropped",
            )),
        }
    }

    fn set_read_buffer(&self, bytes: usize) -> io::Result<()> {
        self.buffers.lock().0 = Some(bytes);
        Ok(())
    }

    fn set_write_buffer(&self, bytes: usize) -> io::Result<()> {
        self.buffers.lock().1 = Some(bytes);
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([0, 0, 0, 0], self.port)))
    }
}

/// Engine whose "network" is a port table inside the process.
#[derive(Default)]
pub struct LoopbackEngine {
    snmp: Arc<Snmp>,
    ports: Mutex<HashMap<u16, mpsc::UnboundedSender<LoopbackSession>>>,
    pub last_listen_addr: Mutex<Option<String>>,
    pub last_shards: Mutex<Option<(usize, usize)>>,
    pub last_listener: Mutex<Option<Arc<LoopbackListener>>>,
    /// Probe of the most recent dialed (client) session
    pub last_dialed: Mutex<Option<ProbeHandle>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Arc<Snmp> {
        self.snmp.clone()
    }
}

fn port_of(addr: &str) -> io::Result<u16> {
    addr.rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("bad address {addr}")))
}

#[async_trait]
impl ReliableUdpEngine for LoopbackEngine {
    async fn listen_with_options(
        &self,
        addr: &str,
        data_shards: usize,
        parity_shards: usize,
    ) -> io::Result<Arc<dyn SessionListener>> {
        let port = port_of(addr)?;
        let mut ports = self.ports.lock();
        if ports.contains_key(&port) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("port {port} in use"),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        ports.insert(port, tx);
        *self.last_listen_addr.lock() = Some(addr.to_string());
        *self.last_shards.lock() = Some((data_shards, parity_shards));
        let listener = Arc::new(LoopbackListener {
            port,
            incoming: tokio::sync::Mutex::new(rx),
            buffers: Mutex::new((None, None)),
        });
        *self.last_listener.lock() = Some(listener.clone());
        Ok(listener)
    }

    async fn dial_with_options(
        &self,
        addr: &str,
        data_shards: usize,
        parity_shards: usize,
    ) -> io::Result<Box<dyn MeasuredSession>> {
        let port = port_of(addr)?;
        let tx = self.ports.lock().get(&port).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("nothing on {port}"))
        })?;
        *self.last_shards.lock() = Some((data_shards, parity_shards));

        let (client, server) = session_pair(self.snmp.clone());
        *self.last_dialed.lock() = Some(client.probe());
        tx.send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener gone"))?;
        Ok(Box::new(client))
    }

    fn snmp(&self) -> &Snmp {
        &self.snmp
    }
}

/// Listens, then accepts and connects concurrently. Returns (server, client)
/// sessions.
pub async fn connect_pair(
    adapter: &dyn ProtocolAdapter,
    server: &mut TestContext,
    client: &TestContext,
) -> (Box<dyn MeasuredSession>, Box<dyn MeasuredSession>) {
    let listener = adapter.listen(server).await.expect("listen");
    server.set_proto_listener(listener);
    let server: &TestContext = server;
    let (accepted, connected) = tokio::join!(adapter.accept(server), adapter.connect(client));
    (accepted.expect("accept"), connected.expect("connect"))
}
