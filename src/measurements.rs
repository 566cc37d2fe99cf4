//! Per-stream and per-interval result records.
//!
//! [`StreamResult`] lives as long as its stream and accumulates byte counts and
//! protocol statistics. [`IntervalResult`] is built fresh at every reporting
//! tick and handed off to reporting.

use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running total of a cumulative counter, advanced by diffing samples.
///
/// `prev_total` is the last sampled cumulative value; counters are expected to
/// be non-decreasing, so it never exceeds the next sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCounter {
    /// Sum of all interval deltas seen so far
    pub total: u64,
    /// Cumulative value at the previous sample
    pub prev_total: u64,
}

impl TrackedCounter {
    /// Folds in a new cumulative sample and returns the interval delta.
    ///
    /// A sample below the previous one means the source counter was reset;
    /// the delta is then zero and tracking restarts from the new value.
    pub fn advance(&mut self, now: u64) -> u64 {
        if now < self.prev_total {
            warn!(
                "cumulative counter went backwards ({} -> {}), treating as reset",
                self.prev_total, now
            );
        }
        let delta = now.saturating_sub(self.prev_total);
        self.total += delta;
        self.prev_total = now;
        delta
    }
}

/// Statistics for one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub retrans: u64,
    pub lost: u64,
    pub early_retrans: u64,
    pub fast_retrans: u64,
    /// RTT sample in microseconds
    pub rtt: u64,
    /// RTO sample in microseconds, zero when the transport has none
    pub rto: u64,
}

/// Accumulated results for one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamResult {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent_this_interval: u64,
    pub bytes_received_this_interval: u64,

    pub retrans: TrackedCounter,
    pub lost: TrackedCounter,
    pub early_retrans: TrackedCounter,
    pub fast_retrans: TrackedCounter,

    // latest absolute values, diffed by the reporting layer
    pub recovers: u64,
    pub in_pkts: u64,
    pub out_pkts: u64,
    pub in_segs: u64,
    pub out_segs: u64,
    pub repeat_segs: u64,

    /// Microseconds; zero means no sample yet
    pub min_rtt: u64,
    /// Microseconds; zero means no sample yet
    pub max_rtt: u64,
    pub sum_rtt: u64,
    pub cnt_rtt: u64,
    /// Latest RTO in microseconds
    pub rto: u64,
}

impl StreamResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
        self.bytes_sent_this_interval += bytes;
    }

    pub fn record_received(&mut self, bytes: u64) {
        self.bytes_received += bytes;
        self.bytes_received_this_interval += bytes;
    }

    /// Clears the this-interval byte counters at an interval boundary.
    pub fn reset_interval(&mut self) {
        self.bytes_sent_this_interval = 0;
        self.bytes_received_this_interval = 0;
    }

    /// Folds an RTT sample (microseconds) into the running extrema and mean.
    ///
    /// Zero doubles as "unset" for the extrema, so a genuine zero sample
    /// replaces whatever minimum or maximum is held next time around.
    pub fn record_rtt(&mut self, rtt: u64) {
        if self.min_rtt == 0 || rtt < self.min_rtt {
            self.min_rtt = rtt;
        }
        if self.max_rtt == 0 || rtt > self.max_rtt {
            self.max_rtt = rtt;
        }
        self.sum_rtt += rtt;
        self.cnt_rtt += 1;
    }

    /// Mean RTT in microseconds over all samples.
    pub fn mean_rtt(&self) -> Option<f64> {
        if self.cnt_rtt == 0 {
            None
        } else {
            Some(self.sum_rtt as f64 / self.cnt_rtt as f64)
        }
    }
}

/// Converts an estimator reading to whole microseconds.
pub fn as_micros(d: Duration) -> u64 {
    d.as_micros().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_counter_deltas() {
        let mut counter = TrackedCounter::default();
        assert_eq!(counter.advance(10), 10);
        assert_eq!(counter.advance(25), 15);
        assert_eq!(counter.advance(25), 0);
        assert_eq!(counter.total, 25);
        assert_eq!(counter.prev_total, 25);
    }

    #[test]
    fn test_tracked_counter_reset() {
        let mut counter = TrackedCounter::default();
        counter.advance(100);
        assert_eq!(counter.advance(4), 0);
        assert_eq!(counter.prev_total, 4);
        assert_eq!(counter.advance(9), 5);
        assert_eq!(counter.total, 105);
    }

    #[test]
    fn test_rtt_extrema_and_mean() {
        let mut result = StreamResult::new();
        assert_eq!(result.mean_rtt(), None);

        for rtt in [5000, 3000, 9000] {
            result.record_rtt(rtt);
        }

        assert_eq!(result.min_rtt, 3000);
        assert_eq!(result.max_rtt, 9000);
        assert_eq!(result.sum_rtt, 17000);
        assert_eq!(result.cnt_rtt, 3);
        assert_eq!(result.mean_rtt(), Some(17000.0 / 3.0));
    }

    #[test]
    fn test_zero_rtt_reads_as_unset() {
        let mut result = StreamResult::new();
        result.record_rtt(0);
        assert_eq!(result.min_rtt, 0);
        result.record_rtt(800);
        // the earlier zero is indistinguishable from "never sampled"
        assert_eq!(result.min_rtt, 800);
        assert_eq!(result.cnt_rtt, 2);
    }

    #[test]
    fn test_byte_accounting() {
        let mut result = StreamResult::new();
        result.record_sent(1024);
        result.record_sent(1024);
        result.record_received(512);
        assert_eq!(result.bytes_sent, 2048);
        assert_eq!(result.bytes_sent_this_interval, 2048);
        assert_eq!(result.bytes_received_this_interval, 512);

        result.reset_interval();
        assert_eq!(result.bytes_sent, 2048);
        assert_eq!(result.bytes_sent_this_interval, 0);
        assert_eq!(result.bytes_received_this_interval, 0);
    }

    #[test]
    fn test_as_micros() {
        assert_eq!(as_micros(Duration::from_millis(12)), 12_000);
        assert_eq!(as_micros(Duration::ZERO), 0);
    }
}
