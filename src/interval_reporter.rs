//! Hands interval results from stream loops to reporting.
//!
//! Stream loops push [`IntervalReport`]s into an unbounded channel and move on;
//! formatting and callbacks run in a separate task, off the data path.

use crate::measurements::IntervalResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One stream's numbers for one reporting interval. `start` and `end` are
/// offsets from the start of the stream loop.
///
/// # Examples
///
/// ```
/// use rperf3_transport::interval_reporter::{format_interval_line, IntervalReport};
/// use rperf3_transport::IntervalResult;
/// use std::time::Duration;
///
/// let report = IntervalReport {
///     stream_id: 7,
///     start: Duration::from_secs(2),
///     end: Duration::from_secs(3),
///     bytes: 125_000_000,
///     bits_per_second: 1_000_000_000.0,
///     stats: IntervalResult { retrans: 4, ..Default::default() },
/// };
///
/// let line = format_interval_line(&report);
/// assert!(line.contains("1.00 Gbits/sec"));
/// assert!(line.contains("4 retr"));
/// ```
#[derive(Debug, Clone)]
pub struct IntervalReport {
    pub stream_id: usize,
    pub start: Duration,
    pub end: Duration,
    /// Payload bytes moved in this interval, in the stream's direction
    pub bytes: u64,
    pub bits_per_second: f64,
    pub stats: IntervalResult,
}

#[derive(Debug, Clone)]
pub enum ReporterMessage {
    Interval(IntervalReport),
    /// No more reports will follow
    Done,
}

/// Receives each report in the reporter task.
pub trait IntervalCallback: Send + Sync {
    fn on_interval(&self, report: &IntervalReport);
}

impl<F> IntervalCallback for F
where
    F: Fn(&IntervalReport) + Send + Sync,
{
    fn on_interval(&self, report: &IntervalReport) {
        self(report)
    }
}

/// Sending half, cheap to clone into every stream task. Sends never block and
/// are dropped silently once the reporter task is gone.
#[derive(Clone)]
pub struct IntervalReporter {
    tx: mpsc::UnboundedSender<ReporterMessage>,
}

impl IntervalReporter {
    /// Returns the reporter and the receiver to hand to [`run_reporter_task`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReporterMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, report: IntervalReport) {
        let _ = self.tx.send(ReporterMessage::Interval(report));
    }

    pub fn finish(&self) {
        let _ = self.tx.send(ReporterMessage::Done);
    }
}

/// Drains reports until [`ReporterMessage::Done`] or every sender is gone.
///
/// Each report goes to `callback` if set, and is printed unless `quiet`.
pub async fn run_reporter_task(
    mut rx: mpsc::UnboundedReceiver<ReporterMessage>,
    quiet: bool,
    callback: Option<Arc<dyn IntervalCallback>>,
) {
    while let Some(ReporterMessage::Interval(report)) = rx.recv().await {
        if let Some(cb) = &callback {
            cb.on_interval(&report);
        }
        if !quiet {
            println!("{}", format_interval_line(&report));
        }
    }
}

const BYTE_UNITS: &[(f64, &str)] = &[(1e9, "GBytes"), (1e6, "MBytes"), (1e3, "KBytes")];
const BIT_UNITS: &[(f64, &str)] = &[(1e9, "Gbits/sec"), (1e6, "Mbits/sec")];

/// Scales `value` by the largest unit it reaches; below all of them the last
/// (smallest) unit is used.
fn scaled(value: f64, units: &[(f64, &'static str)]) -> (f64, &'static str) {
    let (factor, unit) = units
        .iter()
        .find(|(factor, _)| value >= *factor)
        .or(units.last())
        .copied()
        .unwrap_or((1.0, ""));
    (value / factor, unit)
}

/// Renders a report as one human-readable line.
pub fn format_interval_line(report: &IntervalReport) -> String {
    let (amount, amount_unit) = scaled(report.bytes as f64, BYTE_UNITS);
    let (rate, rate_unit) = scaled(report.bits_per_second, BIT_UNITS);
    let stats = &report.stats;

    let mut line = format!(
        "[{:3}] {:5.2}-{:<5.2} sec {:7.2} {} {:7.2} {} {:5} retr {:5} lost {:7.2} ms rtt",
        report.stream_id,
        report.start.as_secs_f64(),
        report.end.as_secs_f64(),
        amount,
        amount_unit,
        rate,
        rate_unit,
        stats.retrans,
        stats.lost,
        stats.rtt as f64 / 1000.0,
    );
    if stats.rto > 0 {
        line.push_str(&format!(" {:7.2} ms rto", stats.rto as f64 / 1000.0));
    }
    line
}
