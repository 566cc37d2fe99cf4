//! Reliable-UDP adapters over an external FEC-capable engine.
//!
//! The engine does the real work (windowing, retransmission, FEC, congestion
//! control) and keeps an [`Snmp`] counter block shared by every session it
//! drives. [`ReliableUdpProto`] adapts an engine to [`ProtocolAdapter`]:
//! it runs the accept-signal handshake, applies session tuning, and turns the
//! engine's cumulative counters into interval deltas.
//!
//! Because the counter block is engine-wide, the deltas attributed to one
//! stream include traffic from every other stream on the same engine. With
//! more than one concurrent stream the per-stream figures are approximate.

use crate::context::TestContext;
use crate::handshake::{recv_accept_signal, send_accept_signal};
use crate::measurements::{as_micros, IntervalResult};
use crate::outcome::IoOutcome;
use crate::protocol::{recv_buffer, send_buffer, ProtocolAdapter};
use crate::session::{
    MeasuredSession, NoDelay, SessionListener, DSCP_EXPEDITED, SESSION_DEADLINE, SESSION_MTU,
};
use crate::snmp::Snmp;
use crate::stream::Stream;
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, error, info, log_enabled, warn, Level, LevelFilter};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

pub const KCP_NAME: &str = "kcp";
pub const RUDP_NAME: &str = "rudp";

/// Which reliable-UDP flavour an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Kcp,
    /// Also exposes RTO and duplicate-segment counts.
    Rudp,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Kcp => KCP_NAME,
            Variant::Rudp => RUDP_NAME,
        }
    }

    /// Host part of the listen address; empty means all interfaces.
    pub fn listen_host(&self) -> &'static str {
        match self {
            Variant::Kcp => "",
            Variant::Rudp => "0.0.0.0",
        }
    }

    pub fn samples_rto(&self) -> bool {
        matches!(self, Variant::Rudp)
    }

    pub fn records_repeat_segs(&self) -> bool {
        matches!(self, Variant::Rudp)
    }
}

/// Whether teardown prints the counter line at this verbosity: info or debug,
/// not quieter and not trace.
fn prints_teardown_diagnostics(max: LevelFilter) -> bool {
    (LevelFilter::Info..=LevelFilter::Debug).contains(&max)
}

/// A reliable-UDP transport library.
///
/// Both peers must use the same shard counts; engines do not negotiate them,
/// and a mismatch silently breaks FEC decoding.
#[async_trait]
pub trait ReliableUdpEngine: Send + Sync + 'static {
    /// Binds a listening session group on `addr` with the given FEC layout.
    /// Every accepted session shares the group's packet socket.
    async fn listen_with_options(
        &self,
        addr: &str,
        data_shards: usize,
        parity_shards: usize,
    ) -> io::Result<Arc<dyn SessionListener>>;

    /// Dials `addr` with the given FEC layout.
    async fn dial_with_options(
        &self,
        addr: &str,
        data_shards: usize,
        parity_shards: usize,
    ) -> io::Result<Box<dyn MeasuredSession>>;

    /// Engine-wide cumulative counters.
    fn snmp(&self) -> &Snmp;
}

/// [`ProtocolAdapter`] for a reliable-UDP engine.
pub struct ReliableUdpProto<E> {
    variant: Variant,
    engine: E,
    signal_mismatches: AtomicU64,
}

impl<E: ReliableUdpEngine> ReliableUdpProto<E> {
    pub fn new(variant: Variant, engine: E) -> Self {
        Self {
            variant,
            engine,
            signal_mismatches: AtomicU64::new(0),
        }
    }

    pub fn kcp(engine: E) -> Self {
        Self::new(Variant::Kcp, engine)
    }

    pub fn rudp(engine: E) -> Self {
        Self::new(Variant::Rudp, engine)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Sessions accepted without a valid accept signal so far.
    pub fn signal_mismatches(&self) -> u64 {
        self.signal_mismatches.load(Ordering::Relaxed)
    }

    fn soft(&self, stream_id: usize, what: &str, res: io::Result<()>) {
        if let Err(e) = res {
            warn!("{} stream {stream_id}: setting {what} failed: {e}", self.variant.name());
        }
    }
}

#[async_trait]
impl<E: ReliableUdpEngine> ProtocolAdapter for ReliableUdpProto<E> {
    fn name(&self) -> &'static str {
        self.variant.name()
    }

    async fn listen(&self, test: &TestContext) -> Result<Arc<dyn SessionListener>> {
        let config = &test.config;
        let addr = format!("{}:{}", self.variant.listen_host(), config.port);
        if let Err(e) = config.validate_fec() {
            return Err(Error::Bind {
                addr,
                source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            });
        }

        let listener = self
            .engine
            .listen_with_options(&addr, config.data_shards, config.parity_shards)
            .await
            .map_err(|source| Error::Bind {
                addr: addr.clone(),
                source,
            })?;

        // shared by every accepted session, so sized for all of them
        if let Err(e) = listener.set_read_buffer(config.read_buf_size) {
            warn!("{} listener on {addr}: setting read buffer failed: {e}", self.name());
        }
        if let Err(e) = listener.set_write_buffer(config.write_buf_size) {
            warn!("{} listener on {addr}: setting write buffer failed: {e}", self.name());
        }
        debug!(
            "{} listening on {addr} with {}+{} FEC shards",
            self.name(),
            config.data_shards,
            config.parity_shards
        );
        Ok(listener)
    }

    async fn accept(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>> {
        debug!("Enter {} accept", self.name());
        let listener = test.proto_listener().ok_or_else(|| {
            Error::Accept(io::Error::new(
                io::ErrorKind::NotConnected,
                "accept before listen",
            ))
        })?;
        let mut session = listener.accept().await.map_err(Error::Accept)?;

        // tolerated: the session is handed over even if the signal is wrong
        match recv_accept_signal(session.as_mut()).await {
            Ok(signal) => debug!("{} accept succeeded, signal = {signal}", self.name()),
            Err(e) => {
                self.signal_mismatches.fetch_add(1, Ordering::Relaxed);
                error!("{} received unexpected accept signal: {e}", self.name())
            }
        }
        Ok(session)
    }

    async fn connect(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>> {
        let config = &test.config;
        let addr = config.target();
        let mut session = self
            .engine
            .dial_with_options(&addr, config.data_shards, config.parity_shards)
            .await
            .map_err(|source| Error::Dial {
                addr: addr.clone(),
                source,
            })?;

        match send_accept_signal(session.as_mut()).await {
            Ok(()) => debug!("{} connect to {addr} succeeded", self.name()),
            Err(e) => error!("{} sending accept signal failed: {e}", self.name()),
        }
        Ok(session)
    }

    async fn send(&self, stream: &mut Stream) -> IoOutcome {
        send_buffer(self.name(), stream).await
    }

    async fn recv(&self, stream: &mut Stream) -> IoOutcome {
        recv_buffer(self.name(), stream).await
    }

    fn init(&self, test: &TestContext, streams: &mut [Stream]) -> Result<()> {
        let config = &test.config;
        let tuning = NoDelay::from_config(config);
        let deadline = Instant::now() + SESSION_DEADLINE;

        for stream in streams.iter_mut() {
            let id = stream.id;
            let session = stream.session_mut();
            let results = [
                ("read buffer", session.set_read_buffer(config.read_buf_size)),
                ("write buffer", session.set_write_buffer(config.write_buf_size)),
                ("window size", session.set_window_size(config.snd_wnd, config.rcv_wnd)),
                ("stream mode", session.set_stream_mode(true)),
                ("DSCP", session.set_dscp(DSCP_EXPEDITED)),
                ("MTU", session.set_mtu(SESSION_MTU)),
                ("ACK no-delay", session.set_ack_no_delay(false)),
                ("no-delay", session.set_no_delay(tuning)),
            ];
            session.set_deadline(Some(deadline));
            for (what, res) in results {
                self.soft(id, what, res);
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
        let snmp = self.engine.snmp().snapshot();
        let rtt = as_micros(stream.session().rtt_var());
        let rto = if self.variant.samples_rto() {
            stream.session().rto().map(as_micros)
        } else {
            None
        };

        let rp = &mut stream.result;
        interval.retrans = rp.retrans.advance(snmp.retrans_segs);
        interval.lost = rp.lost.advance(snmp.lost_segs);
        interval.early_retrans = rp.early_retrans.advance(snmp.early_retrans_segs);
        interval.fast_retrans = rp.fast_retrans.advance(snmp.fast_retrans_segs);

        rp.recovers = snmp.fec_recovered;
        rp.in_pkts = snmp.in_pkts;
        rp.out_pkts = snmp.out_pkts;
        rp.in_segs = snmp.in_segs;
        rp.out_segs = snmp.out_segs;
        if self.variant.records_repeat_segs() {
            rp.repeat_segs = snmp.repeat_segs;
        }

        if let Some(rto) = rto {
            interval.rto = rto;
            rp.rto = rto;
        }
        interval.rtt = rtt;
        rp.record_rtt(rtt);
        Ok(())
    }

    fn teardown(&self, test: &TestContext) -> Result<()> {
        if prints_teardown_diagnostics(log::max_level()) && log_enabled!(Level::Info) {
            println!("{}", self.engine.snmp().snapshot().diagnostic_line());
            if !test.config.no_cong {
                info!(
                    "{}: congestion tracker diagnostics are not collected",
                    self.name()
                );
            }
        }
        Ok(())
    }
}
