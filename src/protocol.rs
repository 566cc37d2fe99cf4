//! The operation contract every transport adapter implements.
//!
//! A harness picks one adapter per run and drives it through
//! `Arc<dyn ProtocolAdapter>`:
//!
//! 1. `listen` / `accept` on the server, `connect` on the client
//! 2. `init` once all streams exist
//! 3. `send` or `recv` in each stream's loop
//! 4. `stats_callback` at every reporting tick
//! 5. `teardown` when the test ends

use crate::context::TestContext;
use crate::measurements::IntervalResult;
use crate::outcome::{classify_error, Direction, IoOutcome};
use crate::session::{MeasuredSession, SessionListener};
use crate::stream::Stream;
use crate::Result;
use async_trait::async_trait;
use log::{debug, error, trace};
use std::io;
use std::sync::Arc;

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Static identifier for logs and reports.
    fn name(&self) -> &'static str;

    /// Opens the server-side endpoint on the configured port.
    async fn listen(&self, test: &TestContext) -> Result<Arc<dyn SessionListener>>;

    /// Waits for the next peer.
    async fn accept(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>>;

    /// Dials the configured target.
    async fn connect(&self, test: &TestContext) -> Result<Box<dyn MeasuredSession>>;

    /// Writes the stream's buffer, counting bytes on success.
    async fn send(&self, stream: &mut Stream) -> IoOutcome;

    /// Reads into the stream's buffer. Bytes only count while the test is
    /// running.
    async fn recv(&self, stream: &mut Stream) -> IoOutcome;

    /// One-time tuning of every stream's session before data flows.
    fn init(&self, test: &TestContext, streams: &mut [Stream]) -> Result<()>;

    /// Samples protocol statistics for one stream into `interval`.
    fn stats_callback(
        &self,
        test: &TestContext,
        stream: &mut Stream,
        interval: &mut IntervalResult,
    ) -> Result<()>;

    /// End-of-test diagnostics. Never touches stream results.
    fn teardown(&self, test: &TestContext) -> Result<()>;
}

fn io_failure(name: &str, direction: Direction, err: io::Error) -> IoOutcome {
    let kind = err.kind();
    let outcome = classify_error(err, direction);
    match &outcome {
        IoOutcome::TransportFault { message, .. } => {
            error!("{name} {direction} error ({kind:?}): {message}")
        }
        _ => debug!("{name} {direction}: session already closed ({kind:?})"),
    }
    outcome
}

/// Send path shared by every adapter.
pub(crate) async fn send_buffer(name: &str, stream: &mut Stream) -> IoOutcome {
    let (session, buffer) = stream.io_parts();
    let len = buffer.len();
    let written = session.write(buffer).await;
    match written {
        Ok(0) if len > 0 => {
            debug!("{name} send: peer accepted no bytes, session closed");
            IoOutcome::GracefulClose
        }
        Ok(n) => {
            stream.result.record_sent(n as u64);
            trace!("{name} send {n} bytes of total {}", stream.result.bytes_sent);
            IoOutcome::Transferred(n)
        }
        Err(e) => io_failure(name, Direction::Send, e),
    }
}

/// Receive path shared by every adapter.
pub(crate) async fn recv_buffer(name: &str, stream: &mut Stream) -> IoOutcome {
    let (session, buffer) = stream.io_parts();
    let read = session.read(buffer).await;
    match read {
        Ok(0) => {
            debug!("{name} recv: end of stream");
            IoOutcome::GracefulClose
        }
        Ok(n) => {
            if stream.is_counting() {
                stream.result.record_received(n as u64);
            }
            trace!("{name} recv {n} bytes of total {}", stream.result.bytes_received);
            IoOutcome::Transferred(n)
        }
        Err(e) => io_failure(name, Direction::Recv, e),
    }
}
