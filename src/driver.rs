//! Per-stream work loop.
//!
//! One task per stream calls `send` or `recv` back to back until the stream
//! ends, and samples statistics whenever a reporting interval has elapsed.

use crate::context::TestContext;
use crate::interval_reporter::{IntervalReport, IntervalReporter};
use crate::measurements::IntervalResult;
use crate::outcome::IoOutcome;
use crate::protocol::ProtocolAdapter;
use crate::stream::Stream;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Which way data flows on this stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Why a stream loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Ran for the configured duration
    Completed,
    /// The session closed
    Closed,
    /// The transport failed
    Fault { kind: io::ErrorKind, message: String },
    /// The cancellation token fired
    Cancelled,
}

async fn transfer(adapter: &dyn ProtocolAdapter, stream: &mut Stream, role: Role) -> IoOutcome {
    match role {
        Role::Sender => adapter.send(stream).await,
        Role::Receiver => adapter.recv(stream).await,
    }
}

fn sample_interval(
    adapter: &dyn ProtocolAdapter,
    test: &TestContext,
    stream: &mut Stream,
    role: Role,
    window: (Instant, Instant, Instant),
    reporter: Option<&IntervalReporter>,
) {
    let (start, from, to) = window;
    let mut stats = IntervalResult::default();
    if let Err(e) = adapter.stats_callback(test, stream, &mut stats) {
        warn!("{} stream {}: stats sampling failed: {e}", adapter.name(), stream.id);
    }

    let bytes = match role {
        Role::Sender => stream.result.bytes_sent_this_interval,
        Role::Receiver => stream.result.bytes_received_this_interval,
    };
    let seconds = (to - from).as_secs_f64();
    let bits_per_second = if seconds > 0.0 {
        bytes as f64 * 8.0 / seconds
    } else {
        0.0
    };

    if let Some(reporter) = reporter {
        reporter.report(IntervalReport {
            stream_id: stream.id,
            start: from - start,
            end: to - start,
            bytes,
            bits_per_second,
            stats,
        });
    }
    stream.result.reset_interval();
}

/// Runs `stream` until the test duration elapses, the session ends, or
/// `cancel` fires. `init` must already have run.
///
/// Returns the stream, with its accumulated result, and why it stopped.
pub async fn run_stream(
    adapter: Arc<dyn ProtocolAdapter>,
    test: Arc<TestContext>,
    mut stream: Stream,
    role: Role,
    reporter: Option<IntervalReporter>,
    cancel: CancellationToken,
) -> (Stream, StreamEnd) {
    let start = Instant::now();
    let test_end = start + test.config.duration;
    let mut last_tick = start;

    let end = loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!("stream {} cancelled", stream.id);
                break StreamEnd::Cancelled;
            }
            _ = time::sleep_until(test_end) => break StreamEnd::Completed,
            outcome = transfer(adapter.as_ref(), &mut stream, role) => outcome,
        };

        match outcome {
            IoOutcome::Transferred(_) => {}
            IoOutcome::GracefulClose => break StreamEnd::Closed,
            IoOutcome::TransportFault { kind, message } => {
                break StreamEnd::Fault { kind, message }
            }
        }

        let now = Instant::now();
        if now - last_tick >= test.config.interval {
            sample_interval(
                adapter.as_ref(),
                &test,
                &mut stream,
                role,
                (start, last_tick, now),
                reporter.as_ref(),
            );
            last_tick = now;
        }
    };

    debug!(
        "{} stream {} finished: {:?} after {:.2}s",
        adapter.name(),
        stream.id,
        end,
        start.elapsed().as_secs_f64()
    );
    (stream, end)
}
